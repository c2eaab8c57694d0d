//! Offline instantiation dry run.
//!
//! Runs the authorize and instantiate stages against a template file, with
//! no template store or renderer involved, and prints the concrete
//! layergroup. With `--owner` the output also carries the public
//! layergroup id prefix (`owner@fingerprint@`) the renderer id would be
//! appended to.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value, json};

use crate::config::ServiceConfig;
use crate::core::MapsError;
use crate::named_maps::public_layergroup_id;
use crate::template::{self, Params};

/// Instantiate a template locally.
#[derive(Args, Debug)]
pub struct InstantiateCommand {
    /// Template JSON file.
    template: PathBuf,

    /// Parameters as a JSON object.
    #[arg(long)]
    params: Option<String>,

    /// Auth token to check against the template's policy.
    #[arg(long)]
    token: Option<String>,

    /// Template owner, used to show the public layergroup id prefix.
    #[arg(long)]
    owner: Option<String>,
}

impl InstantiateCommand {
    pub async fn execute(self, settings: &ServiceConfig) -> Result<()> {
        let template = super::read_template(settings, &self.template).await?;
        template.validate()?;

        if !template::authorize(&template, self.token.as_deref())? {
            return Err(MapsError::Forbidden {
                reason: "Unauthorized template instantiation".to_string(),
            }
            .into());
        }

        let params = parse_params(self.params.as_deref())?;
        let layergroup = template::instantiate(&template, &params)?;
        let prefix = template::fingerprint_prefix(&template)?;

        let mut output = Map::new();
        output.insert("fingerprint".to_string(), json!(prefix));
        if let Some(owner) = &self.owner {
            output.insert(
                "publicIdPrefix".to_string(),
                json!(public_layergroup_id(owner, &prefix, "")),
            );
        }
        output.insert("layergroup".to_string(), layergroup);

        println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);
        Ok(())
    }
}

fn parse_params(raw: Option<&str>) -> Result<Params> {
    let Some(raw) = raw else {
        return Ok(Params::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid --params JSON")? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(MapsError::validation("--params must be a JSON object").into()),
    }
}
