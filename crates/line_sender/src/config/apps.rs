//! Package names of the supported messaging apps

use phf::phf_map;

pub static APP_PACKAGES: phf::Map<&'static str, &'static str> = phf_map! {
    "line" => "jp.naver.line.android",
    "line-lite" => "com.linecorp.linelite",
};

pub const DEFAULT_PACKAGE: &str = "jp.naver.line.android";

/// Resolve an app name to its package name
pub fn get_package_name(app_name: &str) -> Option<&'static str> {
    APP_PACKAGES.get(app_name.to_lowercase().as_str()).copied()
}

/// List the app names that can be resolved
pub fn list_supported_apps() -> Vec<&'static str> {
    APP_PACKAGES.keys().copied().collect()
}
