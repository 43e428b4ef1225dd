//! Fixed names shared across the crate.

pub const APP_NAME: &str = "myco";

/// Length of the truncated hex digest used for pipeline cache keys.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Mount point of the projected source tree inside every build container.
pub const WORKSPACE_DIR: &str = "/workspace";

pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_REGISTRY_NAMESPACE: &str = "mycelium";
pub const DEFAULT_IMAGE_NAME: &str = "mycelium-backend";

/// Config file looked up at the source root when `MYCO_CONFIG` is unset.
pub const CONFIG_FILE_NAME: &str = "myco.toml";
pub const CONFIG_ENV: &str = "MYCO_CONFIG";
pub const CACHE_DIR_ENV: &str = "MYCO_CACHE_DIR";

pub const CI_SUCCESS_MESSAGE: &str = "CI pipeline completed successfully";
