use std::fs;
use std::path::PathBuf;

use chrono::Local;
use fern::Dispatch;

use crate::settings::{AppSettings, LogSettings};

fn get_log_file_path() -> PathBuf {
    if let Some(proj_dirs) = AppSettings::project_dirs() {
        let log_dir = proj_dirs.data_local_dir();
        if log_dir.exists() || fs::create_dir_all(log_dir).is_ok() {
            return log_dir.join("karaoke_lyric.log");
        }
        eprintln!("无法创建日志目录 {log_dir:?}，将在当前目录写入日志。");
    }
    PathBuf::from("karaoke_lyric.log")
}

/// 安装全局日志记录器。控制台总是输出，文件日志按设置启用。
///
/// 已经安装过记录器时返回错误。
pub fn init_logger(settings: &LogSettings) -> Result<(), log::SetLoggerError> {
    let max_level = if settings.enable_file_log {
        settings.console_log_level.max(settings.file_log_level)
    } else {
        settings.console_log_level
    };

    let console_dispatch = Dispatch::new()
        .level(settings.console_log_level)
        .chain(std::io::stderr());

    let mut root = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(max_level)
        .chain(console_dispatch);

    if settings.enable_file_log {
        let log_file_path = get_log_file_path();
        match fern::log_file(&log_file_path) {
            Ok(log_file) => {
                root = root.chain(
                    Dispatch::new()
                        .level(settings.file_log_level)
                        .chain(log_file),
                );
            }
            Err(e) => {
                eprintln!("无法打开日志文件 {log_file_path:?}: {e}。文件日志将被禁用。");
            }
        }
    }

    root.apply()?;
    log::debug!(target: "[日志]", "日志记录器已初始化。");
    Ok(())
}

