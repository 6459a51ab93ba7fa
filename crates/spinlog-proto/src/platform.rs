use std::path::PathBuf;

pub const DAEMON_HTTP_PORT: u16 = 8995;

pub fn data_dir() -> PathBuf {
    // On macOS and Linux, use ~/.local/share/spinlog/ (XDG standard)
    // instead of macOS Application Support for consistency
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".local")
            .join("share")
            .join("spinlog")
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spinlog")
    }
}

pub fn config_dir() -> PathBuf {
    // On macOS and Linux, always use ~/.config/spinlog/
    // (avoid macOS Application Support folder for consistency)
    #[cfg(unix)]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("spinlog")
    }

    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spinlog")
    }
}

/// Where uploaded CSVs and the cleaned `output.json` live by default.
pub fn uploads_dir() -> PathBuf {
    data_dir().join("uploads")
}
