/// Application name, used for directory names.
pub const APP_NAME: &str = "formulary";

/// Length of the truncated hex hash used to identify formulas and configs.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// File written into an install prefix after a successful build.
pub const INSTALL_RECEIPT: &str = "INSTALL_RECEIPT.json";

/// Extension of formula definition files.
pub const FORMULA_EXTENSION: &str = "toml";

/// Name of the cellar directory under the prefix.
pub const CELLAR_DIR: &str = "Cellar";

/// Name of the directory holding stable links to installed formulas.
pub const OPT_DIR: &str = "opt";
