use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: {} (default)", self.effective_base_url()),
        }
        match &self.default_model {
            Some(model) => println!("  default-model: {model}"),
            None => println!("  default-model: {} (default)", self.effective_model()),
        }
        if self.data_sources.is_empty() {
            println!("  data-sources: (none set)");
        } else {
            println!("  data-sources:");
            for source in &self.data_sources {
                println!("    {source}");
            }
        }
        println!("  regenerate: {}", self.regenerate.unwrap_or_default());
        println!("  overlap: {}", self.overlap.unwrap_or_default());
        println!(
            "  connect-timeout: {}s",
            self.effective_connect_timeout().as_secs()
        );
        match self.native_regenerate_enabled() {
            true => println!("  native-regenerate: on"),
            false => println!("  native-regenerate: off"),
        }
    }
}

