//! Builders for test configurations.

#![allow(dead_code)]

use std::path::Path;

use docflow::config::{Config, RegistryBackend};

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(data_directory: &Path) -> Self {
        let mut config = Config::with_data_directory(data_directory);
        config.extraction.enabled = false;
        Self { config }
    }

    pub fn backend(mut self, backend: RegistryBackend) -> Self {
        self.config.registry.backend = backend;
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.jobs.max_concurrent = Some(max);
        self
    }

    pub fn rendered_extension(mut self, ext: &str) -> Self {
        self.config.converter.rendered_extension = ext.to_string();
        self
    }

    pub fn converter(mut self, program: &str, args: &[&str]) -> Self {
        self.config.converter.program = program.to_string();
        self.config.converter.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    /// The config as the JSON a user would write.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.config).expect("Failed to serialize config")
    }
}
