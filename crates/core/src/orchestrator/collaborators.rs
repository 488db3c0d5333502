//! External collaborators a run depends on.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::fetch::{HttpFetcher, PdfFetcher};
use crate::providers::{
    ArxivClient, CitationGraph, CoreClient, CrossrefClient, EuropePmcClient, OaLookup,
    OpenAccessResolver, PdfLocator, RecordLinkResolver, RepositorySearch, ScholarSearch,
    SemanticScholarClient, TitleSearch, UnpaywallClient,
};
use crate::rotation::{ExpressVpnCli, VpnControl};
use crate::strategy::PhaseKind;

use super::config::RunOptions;
use super::types::PipelineError;

/// Trait objects the pipeline calls out to. A phase whose collaborator is
/// missing is skipped.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn PdfFetcher>,
    pub resolver: Arc<dyn OpenAccessResolver>,
    pub citation_graph: Option<Arc<dyn CitationGraph>>,
    pub oa_lookup: Option<Arc<dyn OaLookup>>,
    pub title_search: Option<Arc<dyn TitleSearch>>,
    pub pdf_locator: Option<Arc<dyn PdfLocator>>,
    pub core: Option<Arc<dyn RepositorySearch>>,
    pub europepmc: Option<Arc<dyn RepositorySearch>>,
    pub arxiv: Option<Arc<dyn RepositorySearch>>,
    pub vpn: Option<Arc<dyn VpnControl>>,
}

impl Collaborators {
    /// Only a fetcher; the open-access link comes from the record.
    pub fn new(fetcher: Arc<dyn PdfFetcher>) -> Self {
        Self {
            fetcher,
            resolver: Arc::new(RecordLinkResolver),
            citation_graph: None,
            oa_lookup: None,
            title_search: None,
            pdf_locator: None,
            core: None,
            europepmc: None,
            arxiv: None,
            vpn: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn OpenAccessResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_citation_graph(mut self, graph: Arc<dyn CitationGraph>) -> Self {
        self.citation_graph = Some(graph);
        self
    }

    pub fn with_oa_lookup(mut self, lookup: Arc<dyn OaLookup>) -> Self {
        self.oa_lookup = Some(lookup);
        self
    }

    pub fn with_title_search(mut self, search: Arc<dyn TitleSearch>) -> Self {
        self.title_search = Some(search);
        self
    }

    pub fn with_pdf_locator(mut self, locator: Arc<dyn PdfLocator>) -> Self {
        self.pdf_locator = Some(locator);
        self
    }

    pub fn with_core(mut self, search: Arc<dyn RepositorySearch>) -> Self {
        self.core = Some(search);
        self
    }

    pub fn with_europepmc(mut self, search: Arc<dyn RepositorySearch>) -> Self {
        self.europepmc = Some(search);
        self
    }

    pub fn with_arxiv(mut self, search: Arc<dyn RepositorySearch>) -> Self {
        self.arxiv = Some(search);
        self
    }

    pub fn with_vpn(mut self, vpn: Arc<dyn VpnControl>) -> Self {
        self.vpn = Some(vpn);
        self
    }

    /// Build the real HTTP and CLI clients needed by the planned phases.
    pub fn from_config(config: &Config, options: &RunOptions) -> Result<Self, PipelineError> {
        let planned = options.validate(config)?;
        let timeout = Duration::from_secs(config.download.timeout_secs);

        let fetcher = HttpFetcher::new(&config.download)
            .map_err(|e| PipelineError::setup("PDF fetcher", e))?;
        let mut collaborators = Self::new(Arc::new(fetcher));

        if planned.contains(&PhaseKind::Enrichment) {
            let client = SemanticScholarClient::new(&config.s2_api, timeout)
                .map_err(|e| PipelineError::setup("Semantic Scholar client", e))?;
            collaborators = collaborators.with_citation_graph(Arc::new(client));
        }

        if planned.contains(&PhaseKind::LegalOa) {
            let client = UnpaywallClient::new(
                &config.unpaywall,
                options.unpaywall_email(config),
                timeout,
            )
            .map_err(|e| PipelineError::setup("Unpaywall client", e))?;
            collaborators = collaborators.with_oa_lookup(Arc::new(client));
        }

        if planned.contains(&PhaseKind::SearchFallback) {
            let client = ScholarSearch::new(
                &config.scholar,
                options.scholar_proxy(config),
                &config.download.user_agent,
                timeout,
            )
            .map_err(|e| PipelineError::setup("Google Scholar client", e))?;
            collaborators = collaborators.with_title_search(Arc::new(client));

            if options.use_vpn {
                collaborators = collaborators.with_vpn(Arc::new(ExpressVpnCli::new(&config.vpn)));
            }
        }

        if planned.contains(&PhaseKind::CoreRepository) {
            let client = CoreClient::new(&config.core, timeout)
                .map_err(|e| PipelineError::setup("CORE client", e))?;
            collaborators = collaborators.with_core(Arc::new(client));
        }

        if planned.contains(&PhaseKind::EuropePmc) {
            let client = EuropePmcClient::new(&config.europepmc, timeout)
                .map_err(|e| PipelineError::setup("Europe PMC client", e))?;
            collaborators = collaborators.with_europepmc(Arc::new(client));
        }

        if planned.contains(&PhaseKind::Arxiv) {
            let client = ArxivClient::new(&config.arxiv, timeout)
                .map_err(|e| PipelineError::setup("arXiv client", e))?;
            collaborators = collaborators.with_arxiv(Arc::new(client));
        }

        if planned.contains(&PhaseKind::Crossref) {
            let client = CrossrefClient::new(&config.crossref, timeout)
                .map_err(|e| PipelineError::setup("Crossref client", e))?;
            collaborators = collaborators.with_pdf_locator(Arc::new(client));
        }

        Ok(collaborators)
    }
}
