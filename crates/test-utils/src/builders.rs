use testsched::config::{ConfigFile, ConfigSection, RawConfigFile, TestConfig};
use testsched::dag::TestProperties;

/// Builder for `ConfigFile` to simplify test setup.
pub struct SuiteBuilder {
    config: RawConfigFile,
}

impl SuiteBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                tests: Vec::new(),
            },
        }
    }

    pub fn with_test(mut self, test: TestConfig) -> Self {
        self.config.tests.push(test);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid suite from builder")
    }

    /// Validated suite turned into scheduler input.
    pub fn build_tests(self) -> Vec<TestProperties> {
        let cfg = self.build();
        TestProperties::from_config(&cfg).expect("Failed to build test properties")
    }
}

impl Default for SuiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TestConfig`.
pub struct TestConfigBuilder {
    test: TestConfig,
}

impl TestConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            test: TestConfig {
                name: name.to_string(),
                cmd: "true".to_string(),
                processors: 1,
                run_serial: false,
                resource_lock: vec![],
                resource_groups: None,
                depends: vec![],
                cost: 0.0,
                timeout_secs: None,
                working_directory: None,
            },
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.test.cmd = cmd.to_string();
        self
    }

    pub fn processors(mut self, n: usize) -> Self {
        self.test.processors = n;
        self
    }

    pub fn run_serial(mut self, val: bool) -> Self {
        self.test.run_serial = val;
        self
    }

    pub fn lock(mut self, token: &str) -> Self {
        self.test.resource_lock.push(token.to_string());
        self
    }

    pub fn resource_groups(mut self, groups: &str) -> Self {
        self.test.resource_groups = Some(groups.to_string());
        self
    }

    pub fn depends(mut self, dep: &str) -> Self {
        self.test.depends.push(dep.to_string());
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.test.cost = cost;
        self
    }

    pub fn build(self) -> TestConfig {
        self.test
    }
}
