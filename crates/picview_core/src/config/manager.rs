//! Settings file manager.
//!
//! The file is written whole on first run and patched one table at a time
//! afterwards, so an administrator's hand edits and comments in other
//! tables survive. Every write goes through a temp file and a rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors from reading or writing the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to edit settings file: {0}")]
    Edit(#[from] toml_edit::TomlError),

    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for settings file operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Owns the settings and the file they live in.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for `config_path` holding default settings.
    /// Nothing is read until [`load`](Self::load) or
    /// [`load_or_create`](Self::load_or_create).
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory settings. Persist with [`save`](Self::save) or
    /// [`update_section`](Self::update_section).
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Read the file. Fails with `NotFound` if it does not exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        let content = self.read_existing()?;
        self.settings = self.parse(&content)?;
        Ok(())
    }

    /// Read the file, writing defaults first if it is missing. A file
    /// with unknown or missing tables is rewritten in full.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        match self.read_existing() {
            Ok(content) => {
                self.settings = self.parse(&content)?;
                if needs_rewrite(&content)? {
                    tracing::debug!("Normalizing {}", self.config_path.display());
                    self.save()?;
                }
            }
            Err(ConfigError::NotFound(_)) => {
                self.settings = Settings::default();
                self.save()?;
                tracing::info!("Wrote default settings to {}", self.config_path.display());
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Re-read the file and return the sections that changed on disk.
    pub fn reload(&mut self) -> ConfigResult<Vec<ConfigSection>> {
        let content = self.read_existing()?;
        let fresh = self.parse(&content)?;
        let changed = self.settings.changed_sections(&fresh);
        if !changed.is_empty() {
            tracing::info!(
                "Settings changed on disk: {}",
                changed
                    .iter()
                    .map(|s| s.table_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.settings = fresh;
        }
        Ok(changed)
    }

    /// Write every section, replacing the file.
    pub fn save(&self) -> ConfigResult<()> {
        let mut output = String::from("# picview settings\n\n");
        for section in ConfigSection::ALL {
            output.push_str(section.comment());
            output.push('\n');
            output.push_str(&format!("[{}]\n", section.table_name()));
            output.push_str(&self.section_toml(section)?);
            output.push('\n');
        }
        self.write_atomically(&output)
    }

    /// Replace one table in the file, leaving the rest of the text as it
    /// is on disk.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let mut doc = match self.read_existing() {
            Ok(content) => content.parse::<DocumentMut>()?,
            Err(ConfigError::NotFound(_)) => DocumentMut::new(),
            Err(e) => return Err(e),
        };

        let table: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(table.as_table().clone());
        self.write_atomically(&doc.to_string())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        Ok(match section {
            ConfigSection::Ui => toml::to_string_pretty(&s.ui)?,
            ConfigSection::Lockdown => toml::to_string_pretty(&s.lockdown)?,
            ConfigSection::Slideshow => toml::to_string_pretty(&s.slideshow)?,
            ConfigSection::Queue => toml::to_string_pretty(&s.queue)?,
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
        })
    }

    fn read_existing(&self) -> ConfigResult<String> {
        fs::read_to_string(&self.config_path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(self.config_path.clone()),
            _ => self.io_error(source),
        })
    }

    fn parse(&self, content: &str) -> ConfigResult<Settings> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: self.config_path.clone(),
            source,
        })
    }

    fn io_error(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.config_path.clone(),
            source,
        }
    }

    fn write_atomically(&self, content: &str) -> ConfigResult<()> {
        let write = || -> io::Result<()> {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let temp_path = self.config_path.with_extension("toml.tmp");
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.config_path)
        };
        write().map_err(|e| self.io_error(e))
    }
}

/// Whether the file has tables we don't know or lacks some we do.
fn needs_rewrite(content: &str) -> ConfigResult<bool> {
    let doc: DocumentMut = content.parse()?;
    let known = |key: &str| ConfigSection::ALL.iter().any(|s| s.table_name() == key);

    let unknown_table = doc.iter().any(|(key, _)| !known(key));
    let missing_table = ConfigSection::ALL
        .iter()
        .any(|s| !doc.contains_key(s.table_name()));
    Ok(unknown_table || missing_table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn first_run_writes_commented_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("picview").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[ui]"));
        assert!(content.contains("# Lockdown policy"));
        assert!(content.contains("teardown_timeout_secs = 30"));
        assert!(!config_path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn partial_file_is_filled_in() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        fs::write(&config_path, "[lockdown]\ndisable_save = true\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(manager.settings().lockdown.disable_save);
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[slideshow]"));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("nope.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn bad_toml_reports_path() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        fs::write(&config_path, "[ui\nimage_gallery = ").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        let err = manager.load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("settings.toml"));
    }

    #[test]
    fn update_section_keeps_other_tables_and_comments() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        fs::write(&config_path, format!("# set by admin\n{content}")).unwrap();

        manager.settings_mut().paths.last_save_as_folder = "/exports".to_string();
        manager.settings_mut().ui.image_gallery = false;
        manager.update_section(ConfigSection::Paths).unwrap();

        let written = fs::read_to_string(&config_path).unwrap();
        assert!(written.contains("# set by admin"));

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().paths.last_save_as_folder, "/exports");
        assert!(reloaded.settings().ui.image_gallery);
    }

    #[test]
    fn reload_reports_changed_sections() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        assert!(manager.reload().unwrap().is_empty());

        let mut other = ConfigManager::new(&config_path);
        other.load().unwrap();
        other.settings_mut().lockdown.disable_print = true;
        other.update_section(ConfigSection::Lockdown).unwrap();

        assert_eq!(manager.reload().unwrap(), vec![ConfigSection::Lockdown]);
        assert!(manager.settings().lockdown.disable_print);
    }
}
