use immuno_plugin_api::{
    IM_ALLOCATION_FAILURE, IM_CAPACITY_CHANGE_REJECTED, IM_ERR_INVALID_HANDLE,
    IM_INDEX_OUT_OF_BOUNDS, IM_OUT_OF_RANGE, IM_OVERFLOW, IM_SET_NEGATIVE, IM_SET_NULL,
    IM_TYPE_MISMATCH, IM_VALUE_NOT_FOUND,
};
use serde::Serialize;
use thiserror::Error;

/// Why a register/get/set was rejected. Declaration order is severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueError {
    #[error("value is not in the allow-list")]
    NotFound,
    #[error("null value rejected")]
    Null,
    #[error("negative value rejected by an unsigned type")]
    Negative,
    #[error("capacity change rejected")]
    CapacityChangeRejected,
    #[error("value outside the configured range")]
    OutOfRange,
    #[error("index out of bounds")]
    IndexOutOfBounds,
    #[error("value does not fit the destination")]
    Overflow,
    #[error("value cannot be converted to the destination type")]
    TypeMismatch,
    #[error("allocation failure")]
    AllocationFailure,
    #[error("unknown handle")]
    InvalidHandle,
}

impl ValueError {
    pub const fn code(self) -> i32 {
        match self {
            Self::NotFound => IM_VALUE_NOT_FOUND,
            Self::Null => IM_SET_NULL,
            Self::Negative => IM_SET_NEGATIVE,
            Self::CapacityChangeRejected => IM_CAPACITY_CHANGE_REJECTED,
            Self::OutOfRange => IM_OUT_OF_RANGE,
            Self::IndexOutOfBounds => IM_INDEX_OUT_OF_BOUNDS,
            Self::Overflow => IM_OVERFLOW,
            Self::TypeMismatch => IM_TYPE_MISMATCH,
            Self::AllocationFailure => IM_ALLOCATION_FAILURE,
            Self::InvalidHandle => IM_ERR_INVALID_HANDLE,
        }
    }
}

/// Library-wide initialization outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    #[default]
    Success,
    /// Initialization completed but at least one value was rejected along the way.
    CompletedWithIgnored,
    OutOfMemory,
    PluginDirNotFound,
    PluginOpenFailed,
    PluginEntryMissing,
    PluginInitFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Get,
    Set,
}

/// Last and worst outcome of one method. `None` means the value was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Outcome {
    pub last: Option<ValueError>,
    pub high: Option<ValueError>,
}

impl Outcome {
    fn record(&mut self, outcome: Option<ValueError>) {
        self.last = outcome;
        // `None` orders before every error, so success never lowers the high-water mark.
        if outcome > self.high {
            self.high = outcome;
        }
    }
}

/// Status of one registry class (e.g. every setting).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub class: &'static str,
    pub init: InitStatus,
    pub register: Outcome,
    pub get: Outcome,
    pub set: Outcome,
}

impl StatusRecord {
    pub fn new(class: &'static str) -> Self {
        Self {
            class,
            init: InitStatus::Success,
            register: Outcome::default(),
            get: Outcome::default(),
            set: Outcome::default(),
        }
    }

    pub fn outcome(&self, method: Method) -> &Outcome {
        match method {
            Method::Register => &self.register,
            Method::Get => &self.get,
            Method::Set => &self.set,
        }
    }

    pub fn record(&mut self, method: Method, outcome: Option<ValueError>) {
        match method {
            Method::Register => self.register.record(outcome),
            Method::Get => self.get.record(outcome),
            Method::Set => self.set.record(outcome),
        }
        match outcome {
            Some(ValueError::AllocationFailure) => self.init = InitStatus::OutOfMemory,
            Some(_) if self.init == InitStatus::Success => {
                self.init = InitStatus::CompletedWithIgnored;
            }
            _ => {}
        }
    }

    pub fn reset_last(&mut self) {
        self.register.last = None;
        self.get.last = None;
        self.set.last = None;
    }

    pub fn reset_high(&mut self) {
        self.register.high = None;
        self.get.high = None;
        self.set.high = None;
    }

    pub fn reset(&mut self) {
        self.reset_last();
        self.reset_high();
        self.init = InitStatus::Success;
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
