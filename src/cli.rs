use clap::Parser;

use crate::generator::GeneratorConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Generate Clash config files from proxy subscriptions", long_about = None)]
pub struct Args {
    #[arg(short, long, help = "Generator config, accept file path or URL")]
    pub config: Option<String>,

    #[arg(short, long, help = "Template file path or URL, overrides the config")]
    pub template: Option<String>,

    #[arg(short, long = "subscription", help = "Subscription URL, repeatable")]
    pub subscriptions: Vec<String>,

    #[arg(short, long = "uri", help = "Proxy share link, repeatable")]
    pub uris: Vec<String>,

    #[arg(short, long, help = "Config output path, overrides the config")]
    pub output: Option<String>,

    #[arg(short, long, help = "Emit debug log")]
    pub verbose: bool,
}

impl Args {
    /// Extend or override `config` with the command-line flags
    pub fn apply_to(&self, config: &mut GeneratorConfig) {
        if let Some(template) = &self.template {
            config.template = Some(template.clone());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        config.subscriptions.extend(self.subscriptions.iter().cloned());
        config.uris.extend(self.uris.iter().cloned());
    }
}
