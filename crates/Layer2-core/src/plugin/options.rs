//! Options Parser - 커맨드라인 옵션 처리
//!
//! 플러그인 매니저 옵션(`-load`, `-noload`, `-test` 등), 애플리케이션 옵션,
//! 플러그인 인자를 구분해서 처리합니다. 처리되지 않은 인자는 매니저의 `arguments()` 로 갑니다.

use super::manager::PluginManager;
use super::spec::{PluginSpec, PluginState};
use super::testing::TestSpec;
use extsys_foundation::{Error, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub const LOAD_OPTION: &str = "-load";
pub const NO_LOAD_OPTION: &str = "-noload";
pub const TEST_OPTION: &str = "-test";
pub const NOTEST_OPTION: &str = "-notest";
pub const SCENARIO_OPTION: &str = "-scenario";
pub const PROFILE_OPTION: &str = "-profile";
pub const TRACE_OPTION: &str = "-trace";
pub const NO_CRASHCHECK_OPTION: &str = "-no-crashcheck";
pub const END_OF_OPTIONS: &str = "--";

const ALL: &str = "all";

/// 파싱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// 발견된 애플리케이션 옵션 (인자가 없는 옵션은 빈 문자열)
    pub found_app_options: BTreeMap<String, String>,

    /// `-trace <file>`
    pub trace_file: Option<PathBuf>,
}

/// 옵션 파서
///
/// `PluginManager::parse_options` 를 통해 사용합니다.
pub struct OptionsParser<'a> {
    manager: &'a PluginManager,
    args: &'a [String],
    app_options: &'a BTreeMap<String, bool>,

    position: usize,
    current: String,
    parsed: ParsedOptions,
    test_specs: Vec<TestSpec>,
    dependency_refresh_needed: bool,
    error: Option<String>,
}

impl<'a> OptionsParser<'a> {
    pub fn new(
        manager: &'a PluginManager,
        args: &'a [String],
        app_options: &'a BTreeMap<String, bool>,
    ) -> Self {
        Self {
            manager,
            args,
            app_options,
            position: 0,
            current: String::new(),
            parsed: ParsedOptions::default(),
            test_specs: manager.test_specs(),
            dependency_refresh_needed: false,
            error: None,
        }
    }

    /// 전체 인자 파싱. 첫 에러에서 멈춤
    pub fn parse(mut self) -> Result<ParsedOptions> {
        while self.error.is_none() && self.next_token() {
            // 옵션 처리 순서: 애플리케이션 옵션이 플러그인 옵션보다 우선
            if self.check_for_end_of_options()
                || self.check_for_load_option()
                || self.check_for_no_load_option()
                || self.check_for_profiling_option()
                || self.check_for_no_crashcheck_option()
                || self.check_for_trace_option()
                || self.check_for_test_options()
                || self.check_for_scenario_option()
                || self.check_for_app_option()
                || self.check_for_plugin_option()
                || self.check_for_unknown_option()
            {
                continue;
            }
            // 옵션이 아닌 인자
            self.manager.add_argument(self.current.clone());
        }

        if let Some(message) = self.error {
            return Err(Error::InvalidInput(message));
        }

        let tested = !self.test_specs.is_empty();
        self.manager.set_test_specs(self.test_specs);
        if self.dependency_refresh_needed {
            if tested {
                force_disable_all_except_tested_and_force_enabled(self.manager);
            }
            self.manager.resolve_dependencies();
        }

        Ok(self.parsed)
    }

    // ========================================================================
    // 토큰
    // ========================================================================

    fn next_token(&mut self) -> bool {
        match self.args.get(self.position) {
            Some(arg) => {
                self.current = arg.clone();
                self.position += 1;
                true
            }
            None => {
                self.current.clear();
                false
            }
        }
    }

    /// 옵션 인자가 반드시 필요한 경우
    fn required_token(&mut self) -> bool {
        let option = self.current.clone();
        if self.next_token() && !self.current.starts_with('-') {
            return true;
        }
        self.error = Some(format!("The option {} requires an argument.", option));
        false
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn spec_or_fail(&mut self, name: &str) -> Option<Arc<PluginSpec>> {
        let spec = self.manager.plugin_by_name(name);
        if spec.is_none() {
            self.fail(format!("The plugin \"{}\" does not exist.", name));
        }
        spec
    }

    // ========================================================================
    // 옵션별 처리
    // ========================================================================

    fn check_for_end_of_options(&mut self) -> bool {
        if self.current != END_OF_OPTIONS {
            return false;
        }
        while self.next_token() {
            self.manager.add_argument(self.current.clone());
        }
        true
    }

    fn check_for_load_option(&mut self) -> bool {
        if self.current != LOAD_OPTION {
            return false;
        }
        if !self.required_token() {
            return true;
        }

        if self.current == ALL {
            for spec in self.manager.plugins() {
                if spec.state() != PluginState::Invalid {
                    spec.set_force_enabled(true);
                }
            }
            self.dependency_refresh_needed = true;
        } else {
            let name = self.current.clone();
            let Some(spec) = self.spec_or_fail(&name) else {
                return true;
            };
            spec.set_force_enabled(true);
            self.dependency_refresh_needed = true;
        }

        self.add_for_restart(LOAD_OPTION);
        true
    }

    fn check_for_no_load_option(&mut self) -> bool {
        if self.current != NO_LOAD_OPTION {
            return false;
        }
        if !self.required_token() {
            return true;
        }

        if self.current == ALL {
            for spec in self.manager.plugins() {
                spec.set_force_disabled(true);
            }
            self.dependency_refresh_needed = true;
        } else {
            let name = self.current.clone();
            let Some(spec) = self.spec_or_fail(&name) else {
                return true;
            };
            spec.set_force_disabled(true);
            for requiring in self.manager.plugins_requiring_plugin(&spec) {
                requiring.set_force_disabled(true);
            }
            self.dependency_refresh_needed = true;
        }

        self.add_for_restart(NO_LOAD_OPTION);
        true
    }

    fn check_for_profiling_option(&mut self) -> bool {
        if self.current != PROFILE_OPTION {
            return false;
        }
        self.manager.profiler().increase_verbosity();
        self.manager
            .add_arguments_for_restart(&[PROFILE_OPTION.to_string()]);
        true
    }

    fn check_for_no_crashcheck_option(&mut self) -> bool {
        if self.current != NO_CRASHCHECK_OPTION {
            return false;
        }
        self.manager.crash_check().set_enabled(false);
        self.manager
            .add_arguments_for_restart(&[NO_CRASHCHECK_OPTION.to_string()]);
        true
    }

    fn check_for_trace_option(&mut self) -> bool {
        if self.current != TRACE_OPTION {
            return false;
        }
        if self.required_token() {
            self.parsed.trace_file = Some(PathBuf::from(&self.current));
        }
        true
    }

    fn check_for_test_options(&mut self) -> bool {
        if self.current == TEST_OPTION {
            if !self.required_token() {
                return true;
            }
            if self.current == ALL {
                self.test_specs = self
                    .manager
                    .plugins()
                    .iter()
                    .filter(|s| s.state() != PluginState::Invalid && s.is_effectively_enabled())
                    .map(|s| TestSpec::new(s.id()))
                    .collect();
            } else {
                let mut parts = self.current.split(',').map(str::to_string);
                let name = parts.next().unwrap_or_default();
                let functions: Vec<String> = parts.filter(|f| !f.is_empty()).collect();

                let Some(spec) = self.spec_or_fail(&name) else {
                    return true;
                };
                if self.test_specs.iter().any(|t| t.spec == spec.id()) {
                    self.fail(format!(
                        "The plugin \"{}\" is specified twice for testing.",
                        spec.name()
                    ));
                    return true;
                }
                self.test_specs.push(TestSpec {
                    spec: spec.id(),
                    functions,
                });
            }
            self.dependency_refresh_needed = true;
            return true;
        }

        if self.current == NOTEST_OPTION {
            if !self.required_token() {
                return true;
            }
            let name = self.current.clone();
            let Some(spec) = self.spec_or_fail(&name) else {
                return true;
            };
            let before = self.test_specs.len();
            self.test_specs.retain(|t| t.spec != spec.id());
            if self.test_specs.len() == before {
                self.fail(format!(
                    "Cannot request not to test plugin \"{}\" as it was not requested to be tested.",
                    spec.name()
                ));
            }
            self.dependency_refresh_needed = true;
            return true;
        }

        false
    }

    fn check_for_scenario_option(&mut self) -> bool {
        if self.current != SCENARIO_OPTION {
            return false;
        }
        if self.required_token() {
            let id = self.current.clone();
            if let Err(message) = self.manager.request_scenario(&id) {
                self.fail(message);
            }
        }
        true
    }

    fn check_for_app_option(&mut self) -> bool {
        let Some(&takes_argument) = self.app_options.get(&self.current) else {
            return false;
        };
        let option = self.current.clone();
        let mut argument = String::new();
        if takes_argument {
            if !self.required_token() {
                return true;
            }
            argument = self.current.clone();
        }
        self.parsed.found_app_options.insert(option, argument);
        true
    }

    fn check_for_plugin_option(&mut self) -> bool {
        let option = self.current.clone();
        let found = self.manager.plugins().into_iter().find_map(|spec| {
            spec.argument_descriptions()
                .iter()
                .find(|d| d.flag == option)
                .map(|d| (spec.clone(), !d.parameter.is_empty()))
        });
        let Some((spec, requires_parameter)) = found else {
            return false;
        };

        spec.add_argument(option);
        if requires_parameter && self.required_token() {
            spec.add_argument(self.current.clone());
        }
        debug!("Forwarding option to plugin {}", spec.name());
        true
    }

    fn check_for_unknown_option(&mut self) -> bool {
        if !self.current.starts_with('-') {
            return false;
        }
        let option = self.current.clone();
        self.fail(format!("Unknown option {}", option));
        true
    }

    fn add_for_restart(&self, option: &str) {
        self.manager
            .add_arguments_for_restart(&[option.to_string(), self.current.clone()]);
    }
}

/// 테스트 실행 시 테스트 대상, 강제 활성화, 필수 플러그인 외에는 모두 끔
fn force_disable_all_except_tested_and_force_enabled(manager: &PluginManager) {
    for test in manager.test_specs() {
        if let Some(spec) = manager.spec(test.spec) {
            spec.set_force_enabled(true);
        }
    }
    for spec in manager.plugins() {
        if !spec.is_force_enabled() && !spec.is_required() {
            spec.set_force_disabled(true);
        }
    }
}

// ============================================================================
// 도움말 포맷
// ============================================================================

fn format_option(
    out: &mut String,
    option: &str,
    parameter: &str,
    description: &str,
    option_indentation: usize,
    description_indentation: usize,
) {
    let mut line = format!("{:indent$}{}", "", option, indent = option_indentation);
    if !parameter.is_empty() {
        let _ = write!(line, " <{}>", parameter);
    }
    if line.len() + 1 > description_indentation {
        let _ = writeln!(out, "{}", line);
        line = String::new();
    }
    let _ = writeln!(out, "{:<width$}{}", line, description, width = description_indentation);
}

impl PluginManager {
    /// 플러그인 매니저 옵션 도움말
    pub fn format_options(&self, option_indentation: usize, description_indentation: usize) -> String {
        let mut out = String::new();
        let options = [
            (LOAD_OPTION, "plugin", "Load <plugin> and all plugins that it requires"),
            (
                "-load all",
                "",
                "Load all available plugins",
            ),
            (NO_LOAD_OPTION, "plugin", "Do not load <plugin> and all plugins that require it"),
            (
                "-noload all",
                "",
                "Do not load any plugin (useful when followed by one or more \"-load\" arguments)",
            ),
            (PROFILE_OPTION, "", "Profile plugin loading"),
            (TRACE_OPTION, "file", "Write trace output to <file>"),
            (
                NO_CRASHCHECK_OPTION,
                "",
                "Disable startup check for previously crashed instance",
            ),
            (
                "-test <plugin>[,testfunction[:testdata]]...",
                "",
                "Run plugin's tests (by default a separate settings path is used)",
            ),
            ("-test all", "", "Run tests from all plugins"),
            (NOTEST_OPTION, "plugin", "Exclude all of the plugin's tests from the test run"),
            (SCENARIO_OPTION, "scenarioname", "Run given scenario"),
        ];
        for (option, parameter, description) in options {
            format_option(
                &mut out,
                option,
                parameter,
                description,
                option_indentation,
                description_indentation,
            );
        }
        out
    }

    /// 플러그인별 인자 도움말
    pub fn format_plugin_options(
        &self,
        option_indentation: usize,
        description_indentation: usize,
    ) -> String {
        let mut out = String::new();
        for spec in self.plugins() {
            let descriptions = spec.argument_descriptions();
            if descriptions.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\nPlugin: {}", spec.name());
            for d in descriptions {
                format_option(
                    &mut out,
                    &d.flag,
                    &d.parameter,
                    &d.help,
                    option_indentation,
                    description_indentation,
                );
            }
        }
        out
    }

    /// "이름 버전 설명" 목록
    pub fn format_plugin_versions(&self) -> String {
        let mut out = String::new();
        for spec in self.plugins() {
            if spec.state() == PluginState::Invalid {
                continue;
            }
            let _ = writeln!(
                out,
                "  {:<22} {:<8} {}",
                spec.name(),
                spec.version(),
                spec.description()
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::metadata::{MetadataReader, PluginDependency, PluginMetaData};

    fn manager() -> PluginManager {
        let manager = PluginManager::new();
        let metas = vec![
            PluginMetaData::new("Core", "1.0"),
            PluginMetaData::new("Editor", "1.0")
                .with_dependency(PluginDependency::new("Core", "1.0"))
                .with_argument("-readonly", "", "Open files read only"),
            PluginMetaData::new("Git", "1.0")
                .with_dependency(PluginDependency::new("Editor", "1.0"))
                .with_argument("-git-dir", "dir", "Repository directory"),
            PluginMetaData::new("Welcome", "1.0"),
        ];
        for meta in metas {
            manager.add_spec(MetadataReader::from_metadata(meta, "test").unwrap());
        }
        manager.resolve_dependencies();
        manager
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plugin_and_free_arguments() {
        let manager = manager();
        let mut app = BTreeMap::new();
        app.insert("-client".to_string(), false);
        app.insert("-settingspath".to_string(), true);

        let parsed = manager
            .parse_options(
                &args(&[
                    "-client",
                    "-settingspath",
                    "/tmp/s",
                    "-git-dir",
                    "/repo",
                    "file.txt",
                    "--",
                    "-not-an-option",
                ]),
                &app,
            )
            .unwrap();

        assert_eq!(parsed.found_app_options["-client"], "");
        assert_eq!(parsed.found_app_options["-settingspath"], "/tmp/s");
        let git = manager.plugin_by_name("Git").unwrap();
        assert_eq!(git.arguments(), vec!["-git-dir", "/repo"]);
        assert_eq!(manager.arguments(), vec!["file.txt", "-not-an-option"]);
    }

    #[test]
    fn test_noload_disables_dependents() {
        let manager = manager();
        manager
            .parse_options(&args(&["-noload", "Editor"]), &BTreeMap::new())
            .unwrap();

        assert!(!manager.plugin_by_name("Editor").unwrap().is_effectively_enabled());
        assert!(!manager.plugin_by_name("Git").unwrap().is_effectively_enabled());
        assert!(manager.plugin_by_name("Core").unwrap().is_effectively_enabled());
        assert_eq!(manager.arguments_for_restart(), vec!["-noload", "Editor"]);
    }

    #[test]
    fn test_noload_all_then_load() {
        let manager = manager();
        manager
            .parse_options(&args(&["-noload", "all", "-load", "Git"]), &BTreeMap::new())
            .unwrap();

        let enabled: Vec<String> = manager
            .plugins()
            .iter()
            .filter(|s| s.is_effectively_enabled())
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(enabled, vec!["Core", "Editor", "Git"]);
    }

    #[test]
    fn test_errors() {
        let manager = manager();
        let err = manager
            .parse_options(&args(&["-load", "Nope"]), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("The plugin \"Nope\" does not exist."));

        let err = manager
            .parse_options(&args(&["-load"]), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("The option -load requires an argument."));

        let err = manager
            .parse_options(&args(&["-bogus"]), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown option -bogus"));

        let err = manager
            .parse_options(&args(&["-git-dir"]), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("requires an argument"));
    }

    #[test]
    fn test_test_run_disables_others() {
        let manager = manager();
        manager
            .parse_options(&args(&["-test", "Editor,testOpen:empty", "-profile"]), &BTreeMap::new())
            .unwrap();

        assert!(manager.test_run_requested());
        let tests = manager.test_specs();
        assert_eq!(tests[0].functions, vec!["testOpen:empty"]);

        assert!(manager.plugin_by_name("Editor").unwrap().is_effectively_enabled());
        // 의존 대상은 간접 활성화
        assert!(manager.plugin_by_name("Core").unwrap().is_effectively_enabled());
        assert!(!manager.plugin_by_name("Welcome").unwrap().is_effectively_enabled());
        assert!(!manager.plugin_by_name("Git").unwrap().is_effectively_enabled());
        assert!(manager.profiler().is_enabled());
    }

    #[test]
    fn test_test_twice_and_notest() {
        let manager = manager();
        assert!(manager
            .parse_options(&args(&["-test", "Git", "-test", "git"]), &BTreeMap::new())
            .is_err());

        let manager = self::manager();
        assert!(manager
            .parse_options(&args(&["-notest", "Core"]), &BTreeMap::new())
            .is_err());

        let manager = self::manager();
        manager
            .parse_options(&args(&["-test", "all", "-notest", "Welcome"]), &BTreeMap::new())
            .unwrap();
        assert_eq!(manager.test_specs().len(), 3);
    }

    #[test]
    fn test_second_scenario_is_error() {
        let manager = manager();
        let err = manager
            .parse_options(&args(&["-scenario", "a", "-scenario", "b"]), &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("already requested"));
    }

    #[test]
    fn test_trace_and_crashcheck() {
        let manager = manager();
        let parsed = manager
            .parse_options(&args(&["-trace", "out.log", "-no-crashcheck"]), &BTreeMap::new())
            .unwrap();
        assert_eq!(parsed.trace_file, Some(PathBuf::from("out.log")));
        assert!(!manager.crash_check().is_enabled());
    }

    #[test]
    fn test_format_help() {
        let manager = manager();
        let options = manager.format_options(4, 30);
        assert!(options.contains("    -load <plugin>"));
        assert!(options.contains("-no-crashcheck"));

        let plugin_options = manager.format_plugin_options(4, 30);
        assert!(plugin_options.contains("Plugin: Git"));
        assert!(plugin_options.contains("-git-dir <dir>"));

        let versions = manager.format_plugin_versions();
        assert_eq!(versions.lines().count(), 4);
    }
}
