use log::debug;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            let base_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."));
            base_dir.join("TheAnimeScripter")
        })
        .clone()
}

pub fn get_data_dir() -> PathBuf {
    get_app_data_dir().join("data")
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

/// Job documents and pre-renders live here until their job cleans them up
pub fn get_temp_dir() -> PathBuf {
    get_app_data_dir().join("temp")
}

/// Default destination for processed output
pub fn get_output_dir() -> PathBuf {
    get_app_data_dir().join("output")
}

pub fn get_settings_json_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Last processing options the panel used
pub fn get_options_json_path() -> PathBuf {
    get_data_dir().join("options.json")
}

pub fn initialize_data_directories() -> io::Result<()> {
    let directories = [get_data_dir(), get_logs_dir(), get_temp_dir(), get_output_dir()];

    for dir in &directories {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
            debug!("Created directory: {:?}", dir);
        }
    }

    debug!("Data directories initialized at: {:?}", get_app_data_dir());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_app_dir() {
        let root = get_app_data_dir();
        assert!(root.ends_with("TheAnimeScripter"));
        assert!(get_settings_json_path().starts_with(root.join("data")));
        assert_eq!(get_options_json_path().file_name().unwrap(), "options.json");
        assert!(get_temp_dir().starts_with(&root));
    }
}
