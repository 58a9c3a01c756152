// src/core/engine.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{Local, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn, debug};

use crate::config::Config;
use crate::error::PagewatchError;
use super::{
    load_url_list, normalize_html, ContentDiffer, ContentStore, FetchError, FetchOptions,
    Fingerprint, HttpFetcher, Notifier, Outcome, PageFetcher, RunReport, SmtpNotifier,
    UnchangedReason,
};

/// Per-invocation switches for [`Engine::run`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides `watch.urls_file`
    pub urls_file: Option<PathBuf>,

    /// Send the report when something changed or failed
    pub notify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            urls_file: None,
            notify: true,
        }
    }
}

/// Drives monitoring passes over the configured URL list
pub struct Engine {
    config: Config,
    fetcher: Box<dyn PageFetcher>,
    differ: ContentDiffer,
    notifier: Box<dyn Notifier>,
}

impl Engine {
    /// Create a new engine from a configuration file (or the defaults)
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config.fetch);

        let fetcher = HttpFetcher::new(FetchOptions::from(&config.fetch))
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let notifier = SmtpNotifier::new(config.mail.clone());

        Ok(Self::with_components(config, Box::new(fetcher), Box::new(notifier)))
    }

    pub fn with_components(
        config: Config,
        fetcher: Box<dyn PageFetcher>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let differ = ContentDiffer::new(config.diff.max_lines);
        Self {
            config,
            fetcher,
            differ,
            notifier,
        }
    }

    /// Swap the delivery channel, e.g. for dry runs
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Execute one complete monitoring pass.
    ///
    /// Per-URL fetch failures become [`Outcome::Failed`] and never stop the
    /// pass. State store failures abort it before anything is sent. The
    /// index is committed once, after every URL has been classified, and
    /// before the report goes out.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let urls_file = options
            .urls_file
            .unwrap_or_else(|| self.config.watch.urls_file.clone());
        let urls = load_url_list(&urls_file)?;
        info!("🔍 Watching {} URL(s) from {}", urls.len(), urls_file.display());

        let mut store = self.open_store()?;

        let active: HashSet<String> = urls.iter().cloned().collect();
        let eviction = store.evict_except(&active)?;
        if !eviction.is_empty() {
            info!(
                "🧹 Forgot {} URL(s) no longer listed ({} text file(s) removed, {} failed)",
                eviction.index_entries, eviction.text_files, eviction.failed_deletions
            );
        }

        let mut report = RunReport::new(self.config.diff.max_lines);
        let concurrency = self.config.fetch.max_concurrency.max(1);

        let results = stream::iter(urls.iter())
            .map(|url| async move { (url, self.fetch_text(url).await) })
            .buffered(concurrency);
        let mut results = std::pin::pin!(results);

        while let Some((url, fetched)) = results.next().await {
            let outcome = match fetched {
                Ok(text) => self.classify(&mut store, url, &text)?,
                Err(err) => {
                    warn!("⚠️ Failed to fetch {}: {}", url, err);
                    Outcome::Failed(err.to_string())
                }
            };
            report.push(url.as_str(), outcome);
        }

        store.commit()?;

        info!(
            "📊 Pass complete: {} URL(s), {} changed, {} failed",
            report.outcomes.len(),
            report.changed_count(),
            report.failed_count()
        );

        if !report.needs_notification() {
            info!("No changes, no errors.");
            return Ok(report);
        }

        if !options.notify {
            info!("Notification skipped on request");
            return Ok(report);
        }

        let subject = report.subject(&self.config.mail.subject_prefix, Local::now().date_naive());
        self.notifier
            .send(&subject, &report.body())
            .await
            .with_context(|| format!("state was saved, but the {} report was not delivered", self.notifier.channel_name()))?;

        Ok(report)
    }

    /// Fetch and normalize a single URL, printing the result.
    pub async fn check(&self, url: &str) -> Result<()> {
        let text = self
            .fetch_text(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let fingerprint = Fingerprint::of(&text);

        println!("{}", text);
        println!();
        println!("lines:       {}", text.lines().count());
        println!("fingerprint: {}", fingerprint);

        let store = self.open_store()?;
        match store.prior_fingerprint(url) {
            Some(prior) if prior == fingerprint => println!("stored:      identical"),
            Some(prior) => println!("stored:      differs ({})", prior.short()),
            None => println!("stored:      none"),
        }

        Ok(())
    }

    /// Print what the state store currently remembers.
    pub async fn status(&self) -> Result<()> {
        let store = self.open_store()?;

        if store.is_empty() {
            info!("No snapshots stored in {}", self.config.storage.state_file.display());
            return Ok(());
        }

        for (url, record) in store.entries() {
            let fingerprint = Fingerprint::from_hex(record.hash.clone());
            println!(
                "{}  {}  {}",
                fingerprint.short(),
                record.last_checked.as_deref().unwrap_or("-"),
                url
            );
        }

        Ok(())
    }

    /// Write a default configuration file.
    pub async fn init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let target_dir = match path {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let target = target_dir.join("pagewatch.toml");

        if target.exists() && !force {
            return Err(PagewatchError::Config(format!(
                "{} already exists (use --force to overwrite)",
                target.display()
            ))
            .into());
        }

        std::fs::create_dir_all(&target_dir)?;
        Config::default().save(&target)?;
        info!("✅ Wrote default configuration to {}", target.display());
        Ok(())
    }

    fn open_store(&self) -> Result<ContentStore> {
        let store = ContentStore::open(
            &self.config.storage.state_file,
            &self.config.storage.text_dir,
        )?;
        Ok(store)
    }

    async fn fetch_text(&self, url: &str) -> std::result::Result<String, FetchError> {
        let body = self.fetcher.fetch(url).await?;
        Ok(normalize_html(&body))
    }

    /// Compare a fresh text against the stored snapshot, then record it.
    fn classify(&self, store: &mut ContentStore, url: &str, text: &str) -> Result<Outcome> {
        let fingerprint = Fingerprint::of(text);

        let outcome = match store.prior_fingerprint(url) {
            None => Outcome::Unchanged(UnchangedReason::FirstSeen),
            Some(prior) if !self.differ.has_content_changed(&prior, &fingerprint) => {
                Outcome::Unchanged(UnchangedReason::Identical)
            }
            Some(prior) => match store.prior_text(url)? {
                Some(previous) => {
                    // A text file can run ahead of the index when a pass is cut short.
                    let stored = Fingerprint::of(&previous);
                    if stored == prior {
                        Outcome::Changed(self.differ.diff_content(&previous, text))
                    } else if stored == fingerprint {
                        debug!("{} text already current, index was stale", url);
                        Outcome::Unchanged(UnchangedReason::Identical)
                    } else {
                        Outcome::Unchanged(UnchangedReason::PriorTextMissing)
                    }
                }
                None => Outcome::Unchanged(UnchangedReason::PriorTextMissing),
            },
        };

        store.record_snapshot(url, text, &fingerprint, Utc::now())?;

        match &outcome {
            Outcome::Changed(diff) => info!(
                "✏️ {} changed ({} line(s){})",
                url,
                diff.total_changes,
                if diff.truncated { ", truncated" } else { "" }
            ),
            Outcome::Unchanged(UnchangedReason::FirstSeen) => {
                info!("🆕 {} seen for the first time ({})", url, fingerprint.short())
            }
            Outcome::Unchanged(UnchangedReason::PriorTextMissing) => warn!(
                "{} changed but its previous text is missing or stale; no diff available",
                url
            ),
            Outcome::Unchanged(UnchangedReason::Identical) => debug!("{} unchanged", url),
            Outcome::Failed(_) => {}
        }

        Ok(outcome)
    }
}
