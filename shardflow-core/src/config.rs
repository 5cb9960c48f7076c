//! Job options and their serialized form which gets shipped to every member.

use std::{collections::HashMap, sync::Arc};

use bon::Builder;
use envconfig::Envconfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default capacity of a processor outbox, i.e. how many items a processor may
/// emit in a single scheduling turn.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Options of a job. These are handed to sources when estimating, splitting
/// and reading.
///
/// # Usage
///
/// ```
/// use shardflow::config::JobOptions;
///
/// let options = JobOptions::builder()
///     .job_name("word-count")
///     .local_parallelism(4)
///     .option("input.path", "/data/words") // custom source option
///     .build();
/// assert_eq!(options.get_option("input.path"), Some("/data/words"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct JobOptions {
    #[builder(field)]
    extra: IndexMap<String, String>,
    /// Human readable job name, also used as prefix for metric keys
    #[builder(default = "shardflow-job".to_string())]
    job_name: String,
    /// Processors per member for every vertex which does not request otherwise
    #[builder(default = 1)]
    local_parallelism: usize,
    /// Items a processor may emit per scheduling turn before it must yield
    #[builder(default = DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,
}

impl<S: job_options_builder::State> JobOptionsBuilder<S> {
    /// Provide an additional option, e.g. for configuring a source
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl JobOptions {
    /// Name of the job
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Processors per member
    pub fn local_parallelism(&self) -> usize {
        self.local_parallelism
    }

    /// Capacity of every processor outbox
    pub fn outbox_capacity(&self) -> usize {
        self.outbox_capacity
    }

    /// Get a custom option
    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(|x| x.as_str())
    }

    /// Load options from `SHARDFLOW_*` environment variables
    pub fn from_env() -> Result<Self, OptionsError> {
        Ok(EnvOptions::init_from_env()?.into())
    }

    /// Load options from a map of `SHARDFLOW_*` variables
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, OptionsError> {
        Ok(EnvOptions::init_from_hashmap(vars)?.into())
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions::builder().build()
    }
}

#[derive(Envconfig)]
struct EnvOptions {
    #[envconfig(from = "SHARDFLOW_JOB_NAME", default = "shardflow-job")]
    job_name: String,
    #[envconfig(from = "SHARDFLOW_LOCAL_PARALLELISM", default = "1")]
    local_parallelism: usize,
    #[envconfig(from = "SHARDFLOW_OUTBOX_CAPACITY", default = "1024")]
    outbox_capacity: usize,
}

impl From<EnvOptions> for JobOptions {
    fn from(value: EnvOptions) -> Self {
        JobOptions::builder()
            .job_name(value.job_name)
            .local_parallelism(value.local_parallelism)
            .outbox_capacity(value.outbox_capacity)
            .build()
    }
}

/// [JobOptions] in their serialized form.
/// Suppliers carry this instead of the options themselves and every processor
/// decodes its own copy.
#[derive(Debug, Clone)]
pub struct SerializableOptions {
    encoded: Arc<[u8]>,
}

impl SerializableOptions {
    /// Serialize the given options
    pub fn new(options: &JobOptions) -> Result<Self, OptionsError> {
        let encoded = rmp_serde::to_vec(options)?;
        Ok(Self {
            encoded: encoded.into(),
        })
    }

    /// Decode a fresh copy of the options
    pub fn get(&self) -> Result<JobOptions, OptionsError> {
        Ok(rmp_serde::from_slice(&self.encoded)?)
    }
}

/// Failure to load or transcode [JobOptions]
#[derive(Debug, Error)]
pub enum OptionsError {
    /// Options could not be serialized
    #[error("Error serializing job options")]
    Encode(#[from] rmp_serde::encode::Error),
    /// Serialized options could not be decoded
    #[error("Error deserializing job options")]
    Decode(#[from] rmp_serde::decode::Error),
    /// An environment variable is missing or malformed
    #[error("Invalid job options in environment: {0}")]
    Env(#[from] envconfig::Error),
}
