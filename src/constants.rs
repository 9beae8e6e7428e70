/// Classification tag written into unlinked-data metadata for batch-shaped data
pub const UNLINKED_KIND_DATABASE: &str = "database";

/// File holding slot metadata inside the data directory
pub const UNLINKED_METADATA_FILE: &str = "unlinked-data.json";

/// Directory holding one batch file per slot inside the data directory
pub const UNLINKED_DATA_DIR: &str = "unlinked";

/// Default config file looked up by the CLI
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

// Environment overrides applied on top of the config file
pub const ENV_DATA_DIR: &str = "LCI_IMPORT_DATA_DIR";
pub const ENV_MIGRATIONS_DIR: &str = "LCI_IMPORT_MIGRATIONS_DIR";
pub const ENV_LOG_DIR: &str = "LCI_IMPORT_LOG_DIR";
