use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

use directories::ProjectDirs;
use ini::Ini;
use log::LevelFilter;
use once_cell::sync::Lazy;

use crate::error::Result;

/// QRC 默认的异或密钥表。
pub const DEFAULT_QRC_XOR_KEY_HEX: &str = "629F5B0900C35E95239F13117ED8923FBC90BB740EC347743D90AA3F51D8F411849FDE951DC3C609D59FFA66F9D8F0F7A090A1D6F3C3F3D6A190A0F7F0D8F966FA9FD509C6C31D95DE9F8411F4D8513FAA903D7447C30E74BB90BC3F92D87E11139F23955EC300095B9F6266A1D852F76790CAD64AC34AD6CA9067F752D8A166";

const LOGGING_SECTION: &str = "Logging";
const PARSER_SECTION: &str = "Parser";

static GLOBAL_PARSER_SETTINGS: Lazy<RwLock<ParserSettings>> =
    Lazy::new(|| RwLock::new(ParserSettings::default()));

/// 解析与生成共用的选项。
#[derive(Debug, Clone, PartialEq)]
pub struct ParserSettings {
    /// 为 true 时最后一行持续时间总是无穷大
    pub last_line_infinite: bool,
    pub qrc_xor_key_hex: String,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            last_line_infinite: false,
            qrc_xor_key_hex: DEFAULT_QRC_XOR_KEY_HEX.to_string(),
        }
    }
}

impl ParserSettings {
    /// 覆盖 QRC 异或密钥，兼容不同来源的 QRC 变种。
    pub fn set_qrc_xor_key_hex(&mut self, hex: &str) {
        let cleaned: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        self.qrc_xor_key_hex = if cleaned.len() % 2 == 0 {
            cleaned
        } else {
            format!("0{cleaned}")
        };
    }

    /// 当前进程范围的默认设置。
    pub fn global() -> ParserSettings {
        match GLOBAL_PARSER_SETTINGS.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_global(settings: ParserSettings) {
        match GLOBAL_PARSER_SETTINGS.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub enable_file_log: bool,
    pub file_log_level: LevelFilter,
    pub console_log_level: LevelFilter,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            enable_file_log: false,
            file_log_level: LevelFilter::Info,
            console_log_level: LevelFilter::Warn,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSettings {
    pub log_settings: LogSettings,
    pub parser_settings: ParserSettings,
}

impl AppSettings {
    pub fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "KaraokeLyric", "KaraokeLyric")
    }

    fn config_path() -> Option<PathBuf> {
        let Some(proj_dirs) = Self::project_dirs() else {
            log::error!(target: "[配置]", "无法获取项目配置目录路径。");
            return None;
        };
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            if let Err(e) = fs::create_dir_all(config_dir) {
                log::error!(target: "[配置]", "无法创建配置目录 {config_dir:?}: {e}");
                return None;
            }
        }
        Some(config_dir.join("karaoke_lyric.ini"))
    }

    /// 从默认位置加载配置，文件不存在或损坏时返回默认值。
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            log::warn!(target: "[配置]", "无法确定配置文件路径，使用默认配置。");
            return AppSettings::default();
        };
        if !path.exists() {
            log::info!(target: "[配置]", "配置文件 {path:?} 不存在，使用默认配置。");
            return AppSettings::default();
        }
        match Self::load_from_path(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!(target: "[配置]", "加载配置文件 {path:?} 失败: {e}，使用默认配置。");
                AppSettings::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to_path(&path),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "无法确定配置文件路径，保存失败。",
            )
            .into()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let conf = Ini::load_from_file(path)?;
        let defaults = AppSettings::default();

        let log_section = conf.section(Some(LOGGING_SECTION));
        let read_level = |key: &str, fallback: LevelFilter| {
            log_section
                .and_then(|s| s.get(key))
                .and_then(|s| LevelFilter::from_str(s).ok())
                .unwrap_or(fallback)
        };
        let log_settings = LogSettings {
            enable_file_log: log_section
                .and_then(|s| s.get("EnableFileLog"))
                .and_then(|s| s.parse::<bool>().ok())
                .unwrap_or(defaults.log_settings.enable_file_log),
            file_log_level: read_level("FileLogLevel", defaults.log_settings.file_log_level),
            console_log_level: read_level(
                "ConsoleLogLevel",
                defaults.log_settings.console_log_level,
            ),
        };

        let parser_section = conf.section(Some(PARSER_SECTION));
        let mut parser_settings = ParserSettings {
            last_line_infinite: parser_section
                .and_then(|s| s.get("LastLineInfinite"))
                .and_then(|s| s.parse::<bool>().ok())
                .unwrap_or(defaults.parser_settings.last_line_infinite),
            ..defaults.parser_settings
        };
        if let Some(key) = parser_section
            .and_then(|s| s.get("QrcXorKey"))
            .filter(|s| !s.trim().is_empty())
        {
            parser_settings.set_qrc_xor_key_hex(key);
        }

        log::info!(target: "[配置]", "从 {path:?} 加载配置成功。");
        Ok(AppSettings {
            log_settings,
            parser_settings,
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let mut conf = Ini::new();
        conf.with_section(Some(LOGGING_SECTION))
            .set(
                "EnableFileLog",
                self.log_settings.enable_file_log.to_string(),
            )
            .set("FileLogLevel", self.log_settings.file_log_level.to_string())
            .set(
                "ConsoleLogLevel",
                self.log_settings.console_log_level.to_string(),
            );
        conf.with_section(Some(PARSER_SECTION))
            .set(
                "LastLineInfinite",
                self.parser_settings.last_line_infinite.to_string(),
            )
            .set("QrcXorKey", self.parser_settings.qrc_xor_key_hex.as_str());

        conf.write_to_file(path)?;
        log::info!(target: "[配置]", "配置已保存到 {path:?}。");
        Ok(())
    }
}
