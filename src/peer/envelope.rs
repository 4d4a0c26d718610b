//! JSON shapes exchanged with peer providers

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Application code for success
pub const SUCCESS_CODE: i64 = 200;

/// Response wrapper every provider endpoint returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub err_code: i64,
    #[serde(default)]
    pub err_msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Success carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            err_code: SUCCESS_CODE,
            err_msg: String::new(),
            data: Some(data),
        }
    }

    /// Success without data
    pub fn empty() -> Self {
        Self {
            err_code: SUCCESS_CODE,
            err_msg: String::new(),
            data: None,
        }
    }

    pub fn error(code: i64, msg: &str) -> Self {
        Self {
            err_code: code,
            err_msg: msg.to_string(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err_code == SUCCESS_CODE
    }

    /// Unwrap the payload, turning a failure code into an error
    pub fn into_result(self) -> Result<Option<T>, RemoteError> {
        if self.is_ok() {
            Ok(self.data)
        } else {
            Err(RemoteError::Application {
                code: self.err_code,
                msg: self.err_msg,
            })
        }
    }
}

/// Body of a collect-online request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineQuery {
    #[serde(rename = "Topic")]
    pub topic: String,
}

/// Data of a collect-online response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineData {
    pub online: i64,
}
