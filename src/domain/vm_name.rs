//! VM naming and guest hostname matching
//!
//! One string plays three roles in a bootstrap run: it is the vCenter
//! inventory name, the hostname cloud-init assigns inside the guest, and the
//! value the install watcher polls back out through VMware Tools to decide
//! that installation finished. The watcher can only ever see the name again
//! if it survives all three trips, so `VmName` restricts it to a single DNS
//! label up front.
//!
//! Guest agents do not echo the name back verbatim: depending on the OS and
//! the DHCP/DNS environment, `guest.hostName` may come back upper-cased or
//! fully qualified (`web-01.localdomain`). [`VmName::matches_reported_hostname`]
//! owns that comparison so every caller applies the same rules.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The longest name that still fits in a DNS label
const MAX_LABEL_LEN: usize = 63;

/// Errors that can occur during VM name validation
#[derive(Debug, Error, PartialEq)]
pub enum VmNameError {
    #[error("VM name must be a single DNS label of 1 to 63 characters, got {length}")]
    BadLength { length: usize },

    #[error("VM name '{name}' may only contain ASCII letters, digits, and dashes")]
    UnsupportedCharacter { name: String },

    #[error("VM name '{name}' must start with a letter and must not end with a dash")]
    BadEdgeCharacter { name: String },
}

/// A VM name that is also a valid DNS label
///
/// # Examples
///
/// ```rust
/// use vcenter_vm_bootstrap_lib::domain::VmName;
///
/// let name = VmName::new("web-01")?;
/// assert_eq!(name.as_str(), "web-01");
///
/// // The guest may report the name qualified or in a different case
/// assert!(name.matches_reported_hostname("WEB-01.localdomain"));
///
/// assert!(VmName::new("web_01").is_err());
/// assert!(VmName::new("1web").is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct VmName(String);

impl VmName {
    /// Validate and wrap a VM name
    ///
    /// # Errors
    ///
    /// Returns an error unless the name is a usable DNS label: 1 to 63
    /// ASCII letters, digits, or dashes, starting with a letter and not
    /// ending with a dash.
    pub fn new<S: Into<String>>(name: S) -> Result<Self, VmNameError> {
        let name = name.into();

        if !(1..=MAX_LABEL_LEN).contains(&name.len()) {
            return Err(VmNameError::BadLength { length: name.len() });
        }

        let bytes = name.as_bytes();
        if !bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-') {
            return Err(VmNameError::UnsupportedCharacter { name });
        }

        // bytes is non-empty after the length check
        if !bytes[0].is_ascii_alphabetic() || bytes[bytes.len() - 1] == b'-' {
            return Err(VmNameError::BadEdgeCharacter { name });
        }

        Ok(Self(name))
    }

    /// The name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a hostname reported by the guest agent refers to this VM
    ///
    /// The install watcher polls `guest.hostName` until it stabilizes on the
    /// configured name. Guests frequently report a fully qualified name once
    /// DNS is up, and hostname case is not preserved by every OS, so the
    /// comparison takes the first label and ignores ASCII case. An empty
    /// report never matches.
    #[must_use]
    pub fn matches_reported_hostname(&self, reported: &str) -> bool {
        let label = reported.split('.').next().unwrap_or_default();
        !label.is_empty() && label.eq_ignore_ascii_case(&self.0)
    }
}

impl fmt::Display for VmName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VmName {
    type Error = VmNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
