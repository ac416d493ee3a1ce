use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub meander: MeanderConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            meander: MeanderConfig::default(),
            input: InputConfig::default(),
        }
    }
}

/// Search and tolerance settings, all lengths in design units.
#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_search_margin")]
    pub search_margin: u32,
    #[serde(default = "default_max_expansions")]
    pub max_expansions: u32,
    #[serde(default = "default_length_tolerance")]
    pub length_tolerance: f64,
    #[serde(default = "default_sequential")]
    pub sequential: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            search_margin: default_search_margin(),
            max_expansions: default_max_expansions(),
            length_tolerance: default_length_tolerance(),
            sequential: default_sequential(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MeanderConfig {
    #[serde(default = "default_meander_max_iterations")]
    pub max_iterations: usize,
}

impl Default for MeanderConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_meander_max_iterations(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_design_file")]
    pub design_file: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_image_file")]
    pub image_file: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            design_file: default_design_file(),
            output_file: default_output_file(),
            image_file: default_image_file(),
        }
    }
}

fn default_step_size() -> f64 {
    0.25
}

fn default_search_margin() -> u32 {
    40
}

fn default_max_expansions() -> u32 {
    200_000
}

fn default_length_tolerance() -> f64 {
    1e-3
}

fn default_sequential() -> bool {
    false
}

fn default_meander_max_iterations() -> usize {
    20
}

fn default_design_file() -> String {
    "inputs/chip.toml".to_string()
}

fn default_output_file() -> String {
    "output/routed.toml".to_string()
}

fn default_image_file() -> Option<String> {
    Some("output/routed.png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [routing]
            step_size = 0.1
            sequential = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.routing.step_size, 0.1);
        assert!(cfg.routing.sequential);
        assert_eq!(cfg.routing.search_margin, 40);
        assert_eq!(cfg.meander.max_iterations, 20);
        assert_eq!(cfg.input.design_file, "inputs/chip.toml");
    }
}
