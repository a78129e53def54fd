pub mod engine;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod process_manager;
pub mod utils;

#[cfg(feature = "gui")]
mod commands;

#[cfg(feature = "gui")]
pub use gui::run;

#[cfg(feature = "gui")]
mod gui {
    use crate::commands::{
        jobs::{
            cancel_job, get_active_job, get_engine_status, get_job_log, get_job_progress,
            preview_job, submit_job, validate_options,
        },
        settings::{get_options, get_settings, save_options, update_settings},
    };
    use crate::engine::JobEngine;
    use crate::file_manager::{initialize_json_file, read_json_file_or_default, DebouncedJsonWriter};
    use crate::logging::{cleanup_old_logs, LOG_FILE_NAME};
    use crate::models::Settings;
    use crate::utils::{
        get_logs_dir, get_options_json_path, get_settings_json_path, initialize_data_directories,
    };
    use log::{error, info, warn};
    use std::sync::Arc;
    use tauri::{Manager, RunEvent, WindowEvent};
    use tauri_plugin_log::{Target, TargetKind};

    fn initialize_app_data() -> std::io::Result<()> {
        // Create directory structure
        initialize_data_directories()?;
        initialize_json_file(&get_settings_json_path(), &Settings::default())?;
        Ok(())
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        let init_result = initialize_app_data();

        let app = tauri::Builder::default()
            .plugin(
                tauri_plugin_log::Builder::new()
                    .level(log::LevelFilter::Debug)
                    .targets([
                        Target::new(TargetKind::Stdout),
                        Target::new(TargetKind::Folder {
                            path: get_logs_dir(),
                            file_name: Some(LOG_FILE_NAME.to_string()),
                        }),
                    ])
                    .build(),
            )
            .plugin(tauri_plugin_opener::init())
            .plugin(tauri_plugin_dialog::init())
            .plugin(tauri_plugin_single_instance::init(|app, _argv, _cwd| {
                // Another instance tried to launch - show and focus the existing window
                if let Some(window) = app.get_webview_window("main") {
                    let _ = window.show();
                    let _ = window.unminimize();
                    let _ = window.set_focus();
                }
            }))
            .on_window_event(|window, event| {
                if let WindowEvent::CloseRequested { .. } = event {
                    // Never leave a worker running behind a closed panel
                    if let Some(engine) = window.try_state::<Arc<JobEngine>>() {
                        engine.cancel_active();
                    }
                }
            })
            .setup(move |app| {
                if let Err(e) = &init_result {
                    error!("Failed to initialize app data: {}", e);
                }
                let removed = cleanup_old_logs(&get_logs_dir());
                if removed > 0 {
                    info!("Removed {} expired log file(s)", removed);
                }

                let settings: Settings = read_json_file_or_default(&get_settings_json_path())
                    .unwrap_or_else(|e| {
                        warn!("Settings unreadable, using defaults: {}", e);
                        Settings::default()
                    });

                app.manage(Arc::new(JobEngine::new(settings, app.handle().clone())));
                app.manage(DebouncedJsonWriter::new(get_options_json_path()));
                Ok(())
            })
            .invoke_handler(tauri::generate_handler![
                // Settings
                get_settings,
                update_settings,
                get_options,
                save_options,
                // Jobs
                validate_options,
                preview_job,
                submit_job,
                cancel_job,
                get_engine_status,
                get_active_job,
                get_job_progress,
                get_job_log,
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|app, event| {
            if let RunEvent::Exit = event {
                if let Some(writer) = app.try_state::<DebouncedJsonWriter>() {
                    if let Err(e) = writer.flush() {
                        warn!("Failed to save options on exit: {}", e);
                    }
                }
                if let Some(engine) = app.try_state::<Arc<JobEngine>>() {
                    engine.cancel_active();
                }
            }
        });
    }
}
