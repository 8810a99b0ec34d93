mod defaults;
mod parser;
mod settings;
mod validation;

pub(crate) use parser::split_list;
pub use settings::AppConfig;
