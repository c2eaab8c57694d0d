//! Template fingerprint command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::ServiceConfig;
use crate::constants::FINGERPRINT_PREFIX_LEN;
use crate::template;

/// Print the full content digest and the prefix embedded in layergroup ids.
#[derive(Args, Debug)]
pub struct FingerprintCommand {
    /// Template JSON file.
    template: PathBuf,
}

impl FingerprintCommand {
    pub async fn execute(self, settings: &ServiceConfig) -> Result<()> {
        let template = super::read_template(settings, &self.template).await?;
        let digest = template::fingerprint(&template)?;

        println!("fingerprint: {digest}");
        println!("prefix: {}", &digest[..FINGERPRINT_PREFIX_LEN]);
        Ok(())
    }
}
