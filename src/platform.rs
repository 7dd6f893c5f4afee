use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Prefix shared by all launch shortcut types, e.g. `com.usagewatch.startInstagram`.
pub const SHORTCUT_PREFIX: &str = "com.usagewatch.start";

/// One of the external platforms whose usage is tracked. The set is closed and never changes at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Twitter,
    Youtube,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::Twitter, Platform::Youtube];

    /// Stable identifier. Used in storage keys, so it must never change for an existing platform.
    pub fn id(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Youtube => "youtube",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Twitter => "X",
            Platform::Youtube => "YouTube",
        }
    }

    /// Scheme that opens the native application.
    pub fn scheme(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram://",
            Platform::Twitter => "twitter://",
            Platform::Youtube => "youtube://",
        }
    }

    pub fn web_url(self) -> &'static str {
        match self {
            Platform::Instagram => "https://www.instagram.com",
            Platform::Twitter => "https://x.com",
            Platform::Youtube => "https://www.youtube.com",
        }
    }

    pub fn shortcut_type(self) -> String {
        let suffix = match self {
            Platform::Instagram => "Instagram",
            Platform::Twitter => "Twitter",
            Platform::Youtube => "YouTube",
        };
        format!("{SHORTCUT_PREFIX}{suffix}")
    }

    /// Resolves a launch shortcut type into the platform it starts.
    pub fn from_shortcut(shortcut: &str) -> Option<Platform> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.shortcut_type() == shortcut)
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Platform::ALL
            .into_iter()
            .find(|platform| {
                platform.id().eq_ignore_ascii_case(s) || platform.name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| anyhow!("Unknown platform {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn test_parse_by_id_and_name() {
        assert_eq!("instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("YouTube".parse::<Platform>().unwrap(), Platform::Youtube);
        // X is the display name of twitter
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!(" Twitter ".parse::<Platform>().unwrap(), Platform::Twitter);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_shortcuts_resolve_back() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_shortcut(&platform.shortcut_type()), Some(platform));
        }
        assert_eq!(
            Platform::from_shortcut("com.usagewatch.startYouTube"),
            Some(Platform::Youtube)
        );
        assert_eq!(Platform::from_shortcut("com.usagewatch.startMySpace"), None);
    }
}
