mod cluster;
mod operations;
mod settings;
mod sse;
mod status;

pub(super) use cluster::{get_diskgroups, register_diskgroup};
pub(super) use operations::{cancel_operation, get_operation, list_operations, start_operation};
pub(super) use settings::{get_settings, update_settings};
pub(super) use sse::event_stream;
pub(super) use status::get_status;
