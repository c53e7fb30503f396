//! Plugin Settings - 활성화 설정 영속화
//!
//! | 키 | 의미 |
//! |----|------|
//! | `Plugins/Ignored` | 기본 활성화지만 사용자가 끈 플러그인 |
//! | `Plugins/ForceEnabled` | 기본 비활성화지만 사용자가 켠 플러그인 |
//! | `Plugins/TermsAndConditionsAccepted` | 약관을 수락한 플러그인 |
//!
//! 설치 설정(install)은 기본값 자체를 바꾸고, 사용자 설정(user)은 설정상 활성화 여부만 바꿉니다.

use super::spec::PluginSpec;
use extsys_foundation::{Result, SettingsStore};
use std::sync::Arc;
use tracing::{debug, info};

pub const IGNORED_KEY: &str = "Plugins/Ignored";
pub const FORCE_ENABLED_KEY: &str = "Plugins/ForceEnabled";
pub const TERMS_ACCEPTED_KEY: &str = "Plugins/TermsAndConditionsAccepted";

fn contains(list: &[String], name: &str) -> bool {
    list.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// 설정을 스펙에 적용
pub fn read_settings(
    specs: &[Arc<PluginSpec>],
    install: Option<&dyn SettingsStore>,
    user: Option<&dyn SettingsStore>,
) {
    if let Some(install) = install {
        let ignored = install.string_list(IGNORED_KEY);
        let force_enabled = install.string_list(FORCE_ENABLED_KEY);
        for spec in specs {
            if contains(&ignored, spec.name()) {
                spec.set_enabled_by_default(false);
                spec.set_enabled_by_settings(false);
            } else if contains(&force_enabled, spec.name()) {
                spec.set_enabled_by_default(true);
                spec.set_enabled_by_settings(true);
            }
        }
    }

    if let Some(user) = user {
        let ignored = user.string_list(IGNORED_KEY);
        let force_enabled = user.string_list(FORCE_ENABLED_KEY);
        let accepted = user.string_list(TERMS_ACCEPTED_KEY);
        for spec in specs {
            if contains(&ignored, spec.name()) {
                spec.set_enabled_by_settings(false);
            } else if contains(&force_enabled, spec.name()) {
                spec.set_enabled_by_settings(true);
            }
            spec.set_terms_accepted(contains(&accepted, spec.name()));
        }
    }

    // 약관 미수락 플러그인은 사용자가 켜지 않은 것으로 취급
    for spec in specs {
        if spec.terms_and_conditions().is_some()
            && !spec.terms_accepted()
            && spec.is_enabled_by_settings()
        {
            debug!("{} is disabled until its terms are accepted", spec.name());
            spec.set_enabled_by_settings(false);
        }
    }
}

/// 현재 활성화 상태를 사용자 설정에 기록
pub fn write_settings(specs: &[Arc<PluginSpec>], user: &dyn SettingsStore) -> Result<()> {
    let mut ignored = Vec::new();
    let mut force_enabled = Vec::new();
    let mut accepted = Vec::new();

    for spec in specs {
        if spec.is_enabled_by_default() && !spec.is_enabled_by_settings() {
            ignored.push(spec.name().to_string());
        }
        if !spec.is_enabled_by_default() && spec.is_enabled_by_settings() {
            force_enabled.push(spec.name().to_string());
        }
        if spec.terms_accepted() {
            accepted.push(spec.name().to_string());
        }
    }

    for (key, values) in [
        (IGNORED_KEY, ignored),
        (FORCE_ENABLED_KEY, force_enabled),
        (TERMS_ACCEPTED_KEY, accepted),
    ] {
        if values.is_empty() {
            user.remove(key);
        } else {
            user.set_string_list(key, values);
        }
    }

    info!("Writing plugin settings");
    user.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metadata::{PluginMetaData, TermsAndConditions};
    use crate::plugin::resolver::tests::specs;
    use extsys_foundation::MemorySettings;

    fn set() -> Vec<Arc<PluginSpec>> {
        let mut lab = PluginMetaData::new("Lab", "1.0");
        lab.disabled_by_default = true;
        let mut licensed = PluginMetaData::new("Licensed", "1.0");
        licensed.terms_and_conditions = Some(TermsAndConditions {
            version: 1,
            text: "terms".into(),
        });
        specs(vec![
            PluginMetaData::new("Welcome", "1.0"),
            lab,
            PluginMetaData::new("Git", "1.0"),
            licensed,
        ])
    }

    #[test]
    fn test_user_settings() {
        let set = set();
        let user = MemorySettings::new()
            .with(IGNORED_KEY, &["welcome"])
            .with(FORCE_ENABLED_KEY, &["Lab"]);

        read_settings(&set, None, Some(&user));

        assert!(set[0].is_enabled_by_default());
        assert!(!set[0].is_enabled_by_settings());
        assert!(set[1].is_enabled_by_settings());
        assert!(set[2].is_enabled_by_settings());
    }

    #[test]
    fn test_install_settings_change_defaults() {
        let set = set();
        let install = MemorySettings::new().with(IGNORED_KEY, &["Git"]);

        read_settings(&set, Some(&install), None);
        assert!(!set[2].is_enabled_by_default());
        assert!(!set[2].is_effectively_enabled());
    }

    #[test]
    fn test_terms_must_be_accepted() {
        let set = set();
        read_settings(&set, None, Some(&MemorySettings::new()));
        assert!(!set[3].is_enabled_by_settings());

        let user = MemorySettings::new().with(TERMS_ACCEPTED_KEY, &["Licensed"]);
        let set = self::set();
        read_settings(&set, None, Some(&user));
        assert!(set[3].is_enabled_by_settings());
    }

    #[test]
    fn test_write_settings_records_deviations() {
        let set = set();
        set[0].set_enabled_by_settings(false);
        set[1].set_enabled_by_settings(true);

        let user = MemorySettings::new().with(TERMS_ACCEPTED_KEY, &["stale"]);
        write_settings(&set, &user).unwrap();

        assert_eq!(user.string_list(IGNORED_KEY), vec!["Welcome"]);
        assert_eq!(user.string_list(FORCE_ENABLED_KEY), vec!["Lab"]);
        assert!(!user.contains(TERMS_ACCEPTED_KEY));
    }
}
