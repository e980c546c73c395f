//! Configuration and settings management.
//!
//! Settings are stored in the user's config directory as JSON.

mod settings;

pub use settings::{
    default_config_path, default_data_dir, project_dirs, AnsweringProvider, AnsweringSettings,
    Settings, SettingsError, StorageBackend, StorageSettings, TranscriptionSettings, APP_NAME,
    DATABASE_FILE, SETTINGS_FILE,
};
