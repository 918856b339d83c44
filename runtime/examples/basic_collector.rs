//! Run the default component bundle against an inline configuration.
//!
//! ```sh
//! cargo run --example basic_collector
//! ```

use virta_runtime::prelude::*;

const CONFIG: &str = r#"
receivers:
  opencensus:
processors:
  batch:
    timeout_ms: 500
exporters:
  logging:
extensions:
  health_check:
service:
  extensions: [health_check]
  pipelines:
    traces:
      receivers: [opencensus]
      processors: [batch]
      exporters: [logging]
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let factories = defaults::components()?;
    Service::new(factories).config_yaml(CONFIG).run().await?;
    Ok(())
}
