//! Cloud-init document rendering
//!
//! Renders the three NoCloud documents (`user-data`, `meta-data`,
//! `network-config`) from embedded Tera templates. The user-data document
//! drives Ubuntu's autoinstall; the network-config document is netplan v2
//! for the single static interface.
//!
//! The password projected into user-data is never the plaintext: a
//! precomputed hash wins, a plaintext is hashed with bcrypt, and when
//! neither is configured the disabled-password marker `*` is used so
//! cloud-init does not leave the account open.

use rust_embed::RustEmbed;
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::profile::UbuntuProfile;
use crate::domain::vm_config::VmConfig;

/// Embedded cloud-init templates from the ./templates directory
#[derive(RustEmbed)]
#[folder = "templates/cloud-init/"]
struct CloudInitTemplates;

const USER_DATA_TEMPLATE: &str = "user-data.tera";
const META_DATA_TEMPLATE: &str = "meta-data.tera";
const NETWORK_CONFIG_TEMPLATE: &str = "network-config.tera";

/// The rendered NoCloud document set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInitDocuments {
    pub user_data: String,
    pub meta_data: String,
    pub network_config: String,
}

/// Errors rendering cloud-init documents
#[derive(Debug, Error)]
pub enum CloudInitError {
    #[error("embedded template '{name}' is missing")]
    TemplateMissing { name: &'static str },

    #[error("embedded template '{name}' is not valid UTF-8")]
    TemplateEncoding { name: &'static str },

    #[error("failed to render template '{name}': {source}")]
    RenderFailed {
        name: &'static str,
        #[source]
        source: tera::Error,
    },

    #[error("failed to hash password: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::ConfigValidationError),
}

#[derive(Debug, Serialize)]
struct UserDataContext {
    hostname: String,
    username: String,
    password_hash: String,
    allow_password_ssh: bool,
    ssh_public_keys: Vec<String>,
    timezone: String,
    locale: String,
    has_data_disk: bool,
    data_disk_mount_path: String,
    swap_gb: u64,
    dns_servers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MetaDataContext {
    instance_id: String,
    hostname: String,
}

#[derive(Debug, Serialize)]
struct NetworkConfigContext {
    nic: String,
    ip_address: String,
    prefix_len: u8,
    gateway: String,
    dns_servers: Vec<String>,
}

/// Resolve the password hash projected into the autoinstall identity
///
/// A precomputed hash takes precedence over a plaintext; a plaintext is run
/// through bcrypt; no source at all yields the disabled-password marker `*`.
///
/// # Errors
///
/// Returns an error when bcrypt hashing fails.
pub fn resolve_password_hash(profile: &UbuntuProfile) -> Result<String, CloudInitError> {
    if let Some(hash) = &profile.password_hash {
        return Ok(hash.clone());
    }
    if let Some(plaintext) = &profile.plaintext_password {
        let hash = bcrypt::hash(plaintext.expose_secret(), bcrypt::DEFAULT_COST)?;
        return Ok(hash);
    }
    Ok("*".to_string())
}

/// Renders the NoCloud document set from embedded templates
#[derive(Debug, Default)]
pub struct CloudInitRenderer {}

impl CloudInitRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    /// Render all three documents for an Ubuntu autoinstall
    ///
    /// # Errors
    ///
    /// Returns an error when a template is missing, rendering fails, or the
    /// password hash cannot be computed.
    pub fn render(
        &self,
        config: &VmConfig,
        ubuntu: &UbuntuProfile,
    ) -> Result<CloudInitDocuments, CloudInitError> {
        let password_hash = resolve_password_hash(ubuntu)?;

        let user_data_context = UserDataContext {
            hostname: config.name.clone(),
            username: ubuntu.username.clone(),
            password_hash,
            allow_password_ssh: ubuntu.allow_password_ssh,
            ssh_public_keys: ubuntu.ssh_public_keys.clone(),
            timezone: config.timezone.clone().unwrap_or_else(|| "UTC".to_string()),
            locale: config
                .locale
                .clone()
                .unwrap_or_else(|| "en_US.UTF-8".to_string()),
            has_data_disk: config.hardware.data_disk_gb.is_some(),
            data_disk_mount_path: config
                .hardware
                .data_disk_mount_path
                .clone()
                .unwrap_or_default(),
            swap_gb: config.hardware.swap_gb.unwrap_or(0),
            dns_servers: config.network.dns.clone(),
        };

        let meta_data_context = MetaDataContext {
            instance_id: Uuid::new_v4().to_string(),
            hostname: config.name.clone(),
        };

        let network_config_context = NetworkConfigContext {
            nic: config
                .network
                .guest_nic
                .clone()
                .unwrap_or_else(|| "ens192".to_string()),
            ip_address: config.network.ip_address.clone(),
            prefix_len: config.network.prefix_len()?,
            gateway: config.network.gateway.clone(),
            dns_servers: config.network.dns.clone(),
        };

        Ok(CloudInitDocuments {
            user_data: Self::render_template(USER_DATA_TEMPLATE, &user_data_context)?,
            meta_data: Self::render_template(META_DATA_TEMPLATE, &meta_data_context)?,
            network_config: Self::render_template(
                NETWORK_CONFIG_TEMPLATE,
                &network_config_context,
            )?,
        })
    }

    fn render_template<C: Serialize>(
        name: &'static str,
        context: &C,
    ) -> Result<String, CloudInitError> {
        let embedded =
            CloudInitTemplates::get(name).ok_or(CloudInitError::TemplateMissing { name })?;
        let content = std::str::from_utf8(embedded.data.as_ref())
            .map_err(|_| CloudInitError::TemplateEncoding { name })?;

        let mut tera = tera::Tera::default();
        tera.add_raw_template(name, content)
            .map_err(|source| CloudInitError::RenderFailed { name, source })?;

        let tera_context = tera::Context::from_serialize(context)
            .map_err(|source| CloudInitError::RenderFailed { name, source })?;

        tera.render(name, &tera_context)
            .map_err(|source| CloudInitError::RenderFailed { name, source })
    }
}
