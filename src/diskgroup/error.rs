use serde::Serialize;
use std::fmt;

/// Every failure the diskgroup lifecycle can report, with its stable numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidOp,
    UnsupportedOption,
    MissingArgs,
    MissingInputPayload,
    MissingDiskgroupType,
    MissingDiskgroupName,
    MissingDiskgroupSize,
    DgAlreadyExists,
    DgDoesNotExist,
    NullOutputPayload,
    MissingPropDict,
    MissingStorPropDict,
    MissingReblPropDict,
    MissingFgrpPropDict,
    MissingStorProp,
    MissingReblProp,
    MissingFgrpProp,
    NonModifiable,
    ErrorFetchingDetails,
    InvalidPropValue,
    ErrorReadingPayload,
    GdResizeFailed,
    GdCreateFailed,
    GdDropFailed,
    GdCountMismatch,
    NullPropertyValue,
    InvalidArgs,
    UpdateError,
    DgOperationError,
    InvalidState,
    DgSizeChangeNotPermitted,
    DbaasApiFail,
    DiskGroupLcmInvocationError,
    DbaasObjJobIdReadFail,
    InvalidResize,
}

const PAYLOAD_MISSING_DG: &str = "The output payload did not have details of the specified diskgroup";

impl ErrorKind {
    pub const fn code(self) -> u32 {
        match self {
            Self::InvalidOp => 4001,
            Self::UnsupportedOption => 4002,
            Self::MissingArgs => 4003,
            Self::MissingInputPayload => 4004,
            Self::MissingDiskgroupType => 4005,
            Self::MissingDiskgroupName => 4006,
            Self::MissingDiskgroupSize => 4007,
            Self::DgAlreadyExists => 4008,
            Self::DgDoesNotExist => 4009,
            Self::NullOutputPayload => 4010,
            Self::MissingPropDict => 4011,
            Self::MissingStorPropDict => 4012,
            Self::MissingReblPropDict => 4013,
            Self::MissingFgrpPropDict => 4014,
            Self::MissingStorProp => 4015,
            Self::MissingReblProp => 4016,
            Self::MissingFgrpProp => 4017,
            Self::NonModifiable => 4018,
            Self::ErrorFetchingDetails => 4019,
            Self::InvalidPropValue => 4020,
            Self::ErrorReadingPayload => 4021,
            Self::GdResizeFailed => 4022,
            Self::GdCreateFailed => 4023,
            Self::GdDropFailed => 4024,
            Self::GdCountMismatch => 4025,
            Self::NullPropertyValue => 4031,
            Self::InvalidArgs => 4032,
            Self::UpdateError => 4033,
            Self::DgOperationError => 4034,
            Self::InvalidState => 4035,
            Self::DgSizeChangeNotPermitted => 4038,
            Self::DbaasApiFail => 4039,
            Self::DiskGroupLcmInvocationError => 4040,
            Self::DbaasObjJobIdReadFail => 4041,
            Self::InvalidResize => 4042,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidOp => "Invalid diskgroup operation command",
            Self::UnsupportedOption => {
                "Unsupported option for the given diskgroup operation command"
            }
            Self::MissingArgs => "Mandatory arg(s) for diskgroup operation missing",
            Self::MissingInputPayload => "Input payload JSON is not available or readable",
            Self::MissingDiskgroupType => {
                "Input payload JSON does not have value for diskgroup_type parameter"
            }
            Self::MissingDiskgroupName => {
                "Input payload JSON does not have value for diskgroup_name parameter"
            }
            Self::MissingDiskgroupSize => {
                "Input payload JSON does not have value for new_size parameter"
            }
            Self::DgAlreadyExists => {
                "A Diskgroup with specified name already exists for this cluster; Cannot create another"
            }
            Self::DgDoesNotExist => "Specified Diskgroup does not exist on this cluster",
            Self::NullOutputPayload => "The output payload body is NULL",
            Self::MissingPropDict
            | Self::MissingStorPropDict
            | Self::MissingReblPropDict
            | Self::MissingFgrpPropDict
            | Self::MissingStorProp
            | Self::MissingReblProp
            | Self::MissingFgrpProp => PAYLOAD_MISSING_DG,
            Self::NonModifiable => "Entity in question cannot be modified",
            Self::ErrorFetchingDetails => {
                "There was an error in fetching details of the given entity"
            }
            Self::InvalidPropValue => "Invalid value for queried property",
            Self::ErrorReadingPayload => {
                "Error handling or reading the output payload from a previous operation"
            }
            Self::GdResizeFailed => "Error resizing specified griddisk on given cell",
            Self::GdCreateFailed => "Error creating specified griddisk on given cell",
            Self::GdDropFailed => "Error dropping specified griddisk on given cell",
            Self::GdCountMismatch => "Griddisk count mismatch across diskgroups",
            Self::NullPropertyValue => "No value for the specified property found",
            Self::InvalidArgs => "Incorrect functions arguments",
            Self::UpdateError => "Could not update/modify object in question",
            Self::DgOperationError => "Diskgroup action failed",
            Self::InvalidState => "Invalid object state",
            Self::DgSizeChangeNotPermitted => "Disk Groups Size Change Not Permitted",
            Self::DbaasApiFail => "Dbaas API failed with internal error. Operation failed",
            Self::DiskGroupLcmInvocationError => {
                "Invalid invocation or unsupported DiskGroup LCM option"
            }
            Self::DbaasObjJobIdReadFail => "Dbaas obj Failed to read Job ID from domU",
            Self::InvalidResize => "Resize will lead to loss of DATA/RECO (or SPARSE) diskgroup",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A lifecycle failure: the catalogued kind plus what went wrong this time.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} ({}): {}", kind.message(), kind.code(), detail)]
pub struct DiskgroupError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl DiskgroupError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub const fn code(&self) -> u32 {
        self.kind.code()
    }

    /// The caller-visible log line: canonical message followed by the detail.
    pub fn log_line(&self) -> String {
        if self.detail.is_empty() {
            self.kind.message().to_string()
        } else {
            format!("{} {}", self.kind.message(), self.detail)
        }
    }
}

pub type DgResult<T> = Result<T, DiskgroupError>;

/// Attach an error kind to plumbing failures (transport, I/O, JSON).
pub(crate) trait KindExt<T> {
    fn kind(self, kind: ErrorKind) -> DgResult<T>;
}

impl<T, E: fmt::Display> KindExt<T> for Result<T, E> {
    fn kind(self, kind: ErrorKind) -> DgResult<T> {
        self.map_err(|e| DiskgroupError::new(kind, format!("{e:#}")))
    }
}
