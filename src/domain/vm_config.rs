//! Declarative VM configuration
//!
//! `VmConfig` is the single input of a bootstrap run. It is produced by the
//! caller (decoded from a YAML or JSON file by the CLI), has the defaults
//! table applied, and is then validated once. After validation it is treated
//! as immutable: every later stage reads it, none mutates it.

use std::net::Ipv4Addr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::defaults::BootstrapDefaults;
use super::profile::Profile;
use super::vm_name::{VmName, VmNameError};

/// VM firmware type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Firmware {
    Bios,
    Efi,
}

impl std::fmt::Display for Firmware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bios => write!(f, "bios"),
            Self::Efi => write!(f, "efi"),
        }
    }
}

/// vCenter connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcenterConnection {
    /// vCenter hostname or IP
    pub host: String,

    /// vCenter username, e.g. `administrator@vsphere.local`
    pub username: String,

    /// vCenter password; never logged, never serialized back out
    #[serde(skip_serializing)]
    pub password: SecretString,

    /// HTTPS port; 0 means "use the default" (443)
    #[serde(default)]
    pub port: u16,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
}

/// Virtual hardware sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmHardware {
    pub cpus: u32,
    pub memory_mb: u64,

    /// OS disk size in GiB; minimum 10
    pub disk_gb: u64,

    /// Optional second disk in GiB
    #[serde(default)]
    pub data_disk_gb: Option<u64>,

    /// Mount path for the data disk; required when `data_disk_gb` is set
    #[serde(default)]
    pub data_disk_mount_path: Option<String>,

    /// Swap size in GiB; defaulted from the defaults table when absent
    #[serde(default)]
    pub swap_gb: Option<u64>,

    /// Firmware; defaulted from the defaults table when absent
    #[serde(default)]
    pub firmware: Option<Firmware>,
}

/// Static IPv4 network configuration for the single guest NIC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmNetworkConfig {
    /// vCenter network (port group) name
    pub network_name: String,

    /// Guest NIC device name; defaulted from the defaults table when absent
    #[serde(default)]
    pub guest_nic: Option<String>,

    pub ip_address: String,
    pub netmask: String,
    pub gateway: String,

    /// At least one DNS server is required
    #[serde(default)]
    pub dns: Vec<String>,
}

impl VmNetworkConfig {
    /// The configured IP as a parsed address
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError::InvalidIpv4` if the field does not
    /// parse; cannot fail after `VmConfig::validate` has passed.
    pub fn parsed_ip(&self) -> Result<Ipv4Addr, ConfigValidationError> {
        parse_ipv4("ip_address", &self.ip_address)
    }

    /// CIDR prefix length derived from the netmask
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError::InvalidNetmask` for a non-contiguous
    /// or unparsable mask; cannot fail after `VmConfig::validate` has passed.
    pub fn prefix_len(&self) -> Result<u8, ConfigValidationError> {
        let mask: Ipv4Addr =
            self.netmask
                .parse()
                .map_err(|_| ConfigValidationError::InvalidNetmask {
                    value: self.netmask.clone(),
                })?;
        let bits = u32::from(mask);
        let ones = bits.leading_ones();
        if ones == 0 || bits != u32::MAX << (32 - ones) {
            return Err(ConfigValidationError::InvalidNetmask {
                value: self.netmask.clone(),
            });
        }
        Ok(u8::try_from(ones).unwrap_or(32))
    }
}

/// Placement of the VM inside the vCenter inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmPlacement {
    pub datacenter: String,
    pub datastore: String,

    /// Datastore for uploaded ISO images; defaults to the VM datastore
    #[serde(default)]
    pub iso_datastore: Option<String>,

    /// Inventory folder path; defaults to the datacenter's vm folder
    #[serde(default)]
    pub folder: Option<String>,

    /// Resource pool path; defaults to the cluster root pool
    #[serde(default)]
    pub resource_pool: Option<String>,
}

/// The full declarative configuration for one VM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,

    pub vcenter: VcenterConnection,
    pub hardware: VmHardware,
    pub network: VmNetworkConfig,
    pub placement: VmPlacement,
    pub profile: Profile,

    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,

    /// Skip the post-install SSH reachability probe
    #[serde(default)]
    pub skip_ssh_verify: bool,

    /// Keep the partially created VM and uploaded artifacts on failure
    #[serde(default)]
    pub skip_cleanup_on_error: bool,
}

/// Errors produced by `VmConfig::validate`
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("required field '{field}' is missing or empty")]
    MissingField { field: &'static str },

    #[error("invalid VM name: {0}")]
    InvalidVmName(#[from] VmNameError),

    #[error("disk_gb must be at least 10, got {disk_gb}")]
    DiskTooSmall { disk_gb: u64 },

    #[error("data_disk_mount_path is required when data_disk_gb is set")]
    DataDiskMountPathRequired,

    #[error("field '{field}' is not a valid IPv4 address: '{value}'")]
    InvalidIpv4 { field: &'static str, value: String },

    #[error("netmask is not a valid IPv4 network mask: '{value}'")]
    InvalidNetmask { value: String },

    #[error("ubuntu profile needs at least one SSH public key or a password source")]
    UbuntuNoAccessMethod,

    #[error("allow_password_ssh requires a plaintext password or password hash")]
    PasswordSshRequiresPassword,
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, ConfigValidationError> {
    value
        .parse()
        .map_err(|_| ConfigValidationError::InvalidIpv4 {
            field,
            value: value.to_string(),
        })
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigValidationError> {
    if value.trim().is_empty() {
        return Err(ConfigValidationError::MissingField { field });
    }
    Ok(())
}

impl VmConfig {
    /// Fill unset fields from the defaults table
    ///
    /// Runs before `validate`; a config that still fails validation after
    /// defaulting is genuinely invalid.
    pub fn apply_defaults(&mut self, defaults: &BootstrapDefaults) {
        if self.vcenter.port == 0 {
            self.vcenter.port = defaults.vcenter_port;
        }
        if self.hardware.firmware.is_none() {
            self.hardware.firmware = Some(defaults.firmware);
        }
        if self.hardware.swap_gb.is_none() {
            self.hardware.swap_gb = Some(defaults.swap_gb);
        }
        if self.network.guest_nic.is_none() {
            self.network.guest_nic = Some(defaults.guest_nic.clone());
        }
        if self.timezone.is_none() {
            self.timezone = Some(defaults.timezone.clone());
        }
        if self.locale.is_none() {
            self.locale = Some(defaults.locale.clone());
        }
    }

    /// Check every configuration invariant
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant. The checks are ordered so that
    /// structural problems (missing fields) surface before semantic ones
    /// (unparsable addresses).
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        require("name", &self.name)?;
        VmName::new(self.name.clone())?;

        require("vcenter.host", &self.vcenter.host)?;
        require("vcenter.username", &self.vcenter.username)?;
        require("datacenter", &self.placement.datacenter)?;
        require("datastore", &self.placement.datastore)?;
        require("network_name", &self.network.network_name)?;
        require("ip_address", &self.network.ip_address)?;
        require("netmask", &self.network.netmask)?;
        require("gateway", &self.network.gateway)?;
        if self.network.dns.is_empty() {
            return Err(ConfigValidationError::MissingField { field: "dns" });
        }

        if self.hardware.disk_gb < 10 {
            return Err(ConfigValidationError::DiskTooSmall {
                disk_gb: self.hardware.disk_gb,
            });
        }
        if self.hardware.data_disk_gb.is_some()
            && self
                .hardware
                .data_disk_mount_path
                .as_deref()
                .map_or(true, |path| path.trim().is_empty())
        {
            return Err(ConfigValidationError::DataDiskMountPathRequired);
        }

        parse_ipv4("ip_address", &self.network.ip_address)?;
        parse_ipv4("gateway", &self.network.gateway)?;
        for dns in &self.network.dns {
            parse_ipv4("dns", dns)?;
        }
        self.network.prefix_len()?;

        match &self.profile {
            Profile::Ubuntu(ubuntu) => {
                require("ubuntu.version", &ubuntu.version)?;
                require("ubuntu.username", &ubuntu.username)?;
                if ubuntu.ssh_public_keys.is_empty() && !ubuntu.has_password_source() {
                    return Err(ConfigValidationError::UbuntuNoAccessMethod);
                }
                if ubuntu.allow_password_ssh && !ubuntu.has_password_source() {
                    return Err(ConfigValidationError::PasswordSshRequiresPassword);
                }
            }
            Profile::Talos(talos) => {
                require("talos.version", &talos.version)?;
                require("talos.schematic_id", &talos.schematic_id)?;
            }
        }

        Ok(())
    }

    /// The validated VM name
    ///
    /// # Errors
    ///
    /// Cannot fail after `validate` has passed.
    pub fn vm_name(&self) -> Result<VmName, VmNameError> {
        VmName::new(self.name.clone())
    }

    /// The datastore name for uploaded ISO artifacts
    #[must_use]
    pub fn iso_datastore_name(&self) -> &str {
        self.placement
            .iso_datastore
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.placement.datastore)
    }
}
