//! Pipeline - the context object wiring configuration to components
//!
//! Constructed once per process from a validated [`Config`] and passed to
//! whatever needs it. Holds no global state; tests build one from fake
//! ports with [`Pipeline::with_parts`].

use crate::config::Config;
use crate::document;
use crate::embeddings::{create_embedder, Embedder};
use crate::error::{PipelineError, Result};
use crate::plan::{create_generator, Generator, PlanAssembler, PlanContext, TrainingFacts, UserProfile};
use crate::retrieval::{IndexSnapshot, IndexStatus, RetrievalResult, Retriever};
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Options for one plan request
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Continue with a profile-only prompt if retrieval fails
    pub allow_degraded: bool,
    /// Override the retrieval query derived from the profile
    pub query: Option<String>,
}

/// A finished plan plus what it was built from
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub context: PlanContext,
    pub generator: String,
    pub plan: String,
}

pub struct Pipeline {
    config: Config,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    assembler: PlanAssembler,
    retry: RetryPolicy,
}

impl Pipeline {
    /// Validate `config` and construct the configured embedder and generator
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = create_embedder(&config.embeddings)?;
        let generator = create_generator(&config.generation)?;
        Self::with_parts(config, embedder, generator)
    }

    /// Build from explicit ports
    pub fn with_parts(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        config.validate()?;
        let retriever = Retriever::from_config(&config, embedder)?;
        let retry = config.retry.policy();
        Ok(Self {
            config,
            retriever,
            generator,
            assembler: PlanAssembler::new(),
            retry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn index_path(&self) -> PathBuf {
        self.config.index.path()
    }

    fn document_path(&self) -> Result<PathBuf> {
        self.config.document_path().ok_or_else(|| {
            PipelineError::InvalidConfig("document.path is not set (use --document or config)".into())
        })
    }

    /// Bring the index up to date with the configured document
    ///
    /// With `force`, rebuilds and persists even if the stored index is
    /// current or was built by another model.
    pub fn build(&self, force: bool) -> Result<(IndexSnapshot, IndexStatus)> {
        let document_path = self.document_path()?;
        let index_path = self.index_path();

        if !force {
            return self.retriever.ensure_index(&document_path, &index_path);
        }

        let document = document::load_path(&document_path)?;
        let snapshot = self.retriever.build(&document)?;
        self.retriever.persist(&index_path)?;
        Ok((snapshot, IndexStatus::Rebuilt))
    }

    /// Make an index active for querying
    ///
    /// With a document configured this behaves like `build(false)`; without
    /// one the persisted index is loaded as is.
    pub fn open_index(&self) -> Result<IndexSnapshot> {
        if let Some(snapshot) = self.retriever.snapshot() {
            return Ok(snapshot);
        }
        if self.config.document_path().is_some() {
            return self.build(false).map(|(snapshot, _)| snapshot);
        }
        self.retriever.load(&self.index_path())
    }

    /// Top-k passages for free text; `k` defaults to `retrieval.top_k`
    pub fn query(&self, text: &str, k: Option<usize>) -> Result<RetrievalResult> {
        self.open_index()?;
        self.retriever.query(text, k.unwrap_or(self.retriever.top_k()))
    }

    /// Facts, retrieval and prompt for `profile`, without generating
    ///
    /// A retrieval failure degrades to a profile-only prompt only when
    /// `options.allow_degraded` is set.
    pub fn prepare(&self, profile: &UserProfile, options: &PlanOptions) -> Result<PlanContext> {
        profile.validate()?;
        let facts = TrainingFacts::derive(profile);
        let query = options
            .query
            .clone()
            .unwrap_or_else(|| profile.retrieval_query());

        let retrieval = self
            .open_index()
            .and_then(|_| self.retriever.query_default(&query));

        match retrieval {
            Ok(retrieval) => self.assembler.assemble(profile, Some(&facts), &retrieval),
            Err(err) if options.allow_degraded => {
                warn!(error = %err, "retrieval failed, continuing without reference material");
                self.assembler.assemble_degraded(profile, Some(&facts))
            }
            Err(err) => Err(err),
        }
    }

    /// Run the generator over a prepared context, retrying transient failures
    pub fn generate(&self, context: PlanContext) -> Result<PlanOutcome> {
        let generated = self
            .retry
            .run("generate plan", || self.generator.generate(&context))?;
        info!(
            generator = self.generator.name(),
            references = context.references.len(),
            degraded = context.degraded,
            "plan generated"
        );

        Ok(PlanOutcome {
            plan: self.assembler.render(generated),
            generator: self.generator.name().to_string(),
            context,
        })
    }

    /// Full plan: facts, retrieval, prompt, generation
    pub fn plan(&self, profile: &UserProfile, options: &PlanOptions) -> Result<PlanOutcome> {
        let context = self.prepare(profile, options)?;
        self.generate(context)
    }
}
