//! Headless gallery presenter.
//!
//! Drives a [`SyncEngine`] and a [`RenderWindow`], prints the visible photos
//! and reacts to commands typed on stdin.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ErrorKind;
use crate::layout::{RenderWindow, ScrollMetrics, WindowChange, WindowConfig};
use crate::models::{Snapshot, SortOrder, UrlFallback};
use crate::remote::{Credentials, DriveClient};
use crate::sync::{SyncEngine, SyncEvent, SyncPhase};

const HELP: &str = "commands: more | scroll <offset> <viewport> <content> | refresh | \
sort <field>:<dir> | status | urls <id> | next-url <id> | connect <api-key> <folder-id> | quit";

/// A console command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    More,
    Scroll(ScrollMetrics),
    Refresh,
    Sort(SortOrder),
    Status,
    Urls(String),
    NextUrl(String),
    Connect(Credentials),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let name = parts.next().ok_or_else(|| "empty command".to_string())?;
        let args: Vec<&str> = parts.collect();

        let arity = |count: usize| -> Result<(), String> {
            if args.len() == count {
                Ok(())
            } else {
                Err(format!("{} takes {} argument(s)", name, count))
            }
        };

        let command = match name {
            "more" => {
                arity(0)?;
                Command::More
            }
            "scroll" => {
                arity(3)?;
                let mut values = [0.0f64; 3];
                for (slot, raw) in values.iter_mut().zip(&args) {
                    *slot = raw
                        .parse::<f64>()
                        .map_err(|_| format!("not a number: {}", raw))?;
                }
                Command::Scroll(ScrollMetrics {
                    offset: values[0],
                    viewport_height: values[1],
                    content_height: values[2],
                })
            }
            "refresh" => {
                arity(0)?;
                Command::Refresh
            }
            "sort" => {
                arity(1)?;
                Command::Sort(args[0].parse::<SortOrder>()?)
            }
            "status" => {
                arity(0)?;
                Command::Status
            }
            "urls" => {
                arity(1)?;
                Command::Urls(args[0].to_string())
            }
            "next-url" => {
                arity(1)?;
                Command::NextUrl(args[0].to_string())
            }
            "connect" => {
                arity(2)?;
                Command::Connect(Credentials::new(args[0], args[1]))
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(command)
    }
}

/// What folding one engine event into the gallery did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GalleryUpdate {
    pub change: WindowChange,
    /// Photos to announce; zero for the first snapshot and when
    /// notifications are off.
    pub new_photos: usize,
    pub failed: bool,
}

/// Presentation-side state: the last published snapshot and the render
/// window over it.
#[derive(Debug)]
pub struct Gallery {
    snapshot: Arc<Snapshot>,
    window: RenderWindow,
    notifications: bool,
    loaded: bool,
    last_error: Option<String>,
    fallbacks: HashMap<String, UrlFallback>,
}

impl Gallery {
    pub fn new(config: WindowConfig, notifications: bool) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty()),
            window: RenderWindow::new(config),
            notifications,
            loaded: false,
            last_error: None,
            fallbacks: HashMap::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn window(&self) -> &RenderWindow {
        &self.window
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn handle_event(&mut self, event: SyncEvent) -> GalleryUpdate {
        match event {
            SyncEvent::Updated {
                generation,
                snapshot,
                diff,
                from_cache,
            } => {
                debug!(
                    "Gallery: generation {} ({} photos, cached: {})",
                    generation,
                    snapshot.len(),
                    from_cache
                );
                let change = self.window.apply_update(&snapshot, &diff);
                let window = &self.window;
                self.fallbacks.retain(|id, _| window.contains(id));
                self.snapshot = snapshot;
                self.last_error = None;

                let new_photos = if self.loaded && self.notifications {
                    diff.added.len()
                } else {
                    0
                };
                self.loaded = true;

                if new_photos > 0 {
                    info!(
                        "{} new photo{}",
                        new_photos,
                        if new_photos == 1 { "" } else { "s" }
                    );
                }

                GalleryUpdate {
                    change,
                    new_photos,
                    failed: false,
                }
            }
            SyncEvent::Resorted { snapshot, order } => {
                debug!("Gallery: resorted by {}", order);
                self.snapshot = snapshot;
                let inserted = self.window.reset(&self.snapshot);
                GalleryUpdate {
                    change: WindowChange {
                        inserted,
                        removed: 0,
                        reset: true,
                    },
                    ..Default::default()
                }
            }
            SyncEvent::Cleared => {
                let removed = self.window.len();
                self.window.clear();
                self.snapshot = Arc::new(Snapshot::empty());
                self.fallbacks.clear();
                self.last_error = None;
                self.loaded = false;
                GalleryUpdate {
                    change: WindowChange {
                        inserted: 0,
                        removed,
                        reset: true,
                    },
                    ..Default::default()
                }
            }
            SyncEvent::Failed {
                generation,
                error,
                kind,
            } => {
                debug!("Gallery: generation {} failed", generation);
                // The gallery keeps showing the previous snapshot.
                self.last_error = Some(match kind {
                    ErrorKind::Configuration => {
                        format!("{} (set them with: connect <api-key> <folder-id>)", error)
                    }
                    ErrorKind::Transport => error,
                });
                GalleryUpdate {
                    failed: true,
                    ..Default::default()
                }
            }
        }
    }

    pub fn load_more(&mut self) -> usize {
        self.window.load_more(&self.snapshot)
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> usize {
        self.window.on_scroll(&self.snapshot, metrics)
    }

    /// The display URL chain for `id`, with any candidates already marked
    /// failed by [`Gallery::next_url`] skipped.
    pub fn urls(&self, id: &str) -> Option<UrlFallback> {
        let photo = self.snapshot.get(id)?;
        Some(
            self.fallbacks
                .get(id)
                .cloned()
                .unwrap_or_else(|| photo.display_candidates()),
        )
    }

    /// Marks the current display URL for `id` as failed and returns the next
    /// candidate. `Ok(None)` once every candidate has failed.
    pub fn next_url(&mut self, id: &str) -> Result<Option<String>, String> {
        let photo = self
            .snapshot
            .get(id)
            .ok_or_else(|| format!("no photo with id {}", id))?;
        let chain = self
            .fallbacks
            .entry(id.to_string())
            .or_insert_with(|| photo.display_candidates());
        Ok(chain.advance().map(str::to_string))
    }

    /// The visible window, one line per photo.
    pub fn render(&self) -> Vec<String> {
        if self.window.is_empty() {
            let line = if self.snapshot.is_empty() {
                "no photos"
            } else {
                "no photos loaded yet"
            };
            return vec![line.to_string()];
        }

        let mut lines = Vec::with_capacity(self.window.len() + 1);
        lines.push(format!(
            "showing {} of {} photos",
            self.window.len(),
            self.snapshot.len()
        ));
        for (entry, photo) in self
            .window
            .entries()
            .iter()
            .zip(self.window.visible(&self.snapshot))
        {
            let thumb = photo.thumbnail_candidates();
            lines.push(format!(
                "{:>5}  {}  {}  {}",
                entry.position,
                photo.id,
                photo.name,
                thumb.current().unwrap_or("-")
            ));
        }
        lines
    }
}

/// The console application.
pub struct GalleryApp {
    settings: Settings,
    settings_path: PathBuf,
    once: bool,
}

impl GalleryApp {
    pub fn new(settings: Settings, settings_path: PathBuf, once: bool) -> Self {
        Self {
            settings,
            settings_path,
            once,
        }
    }

    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime")?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(mut self) -> Result<()> {
        let client = DriveClient::new().context("Failed to create HTTP client")?;
        let (engine, mut events) = SyncEngine::new(
            Arc::new(client),
            self.settings.credentials(),
            self.settings.sort_order,
            self.settings.sync_config(),
        );
        let mut gallery = Gallery::new(
            self.settings.window_config(),
            self.settings.notifications.enabled,
        );

        if self.once {
            return Self::run_once(&engine, &mut events, &mut gallery).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sync_task = tokio::spawn(Arc::clone(&engine).run(shutdown_rx));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let update = gallery.handle_event(event);
                    if update.failed {
                        if let Some(error) = gallery.last_error() {
                            println!("sync failed: {}", error);
                        }
                    } else if update.change.reset || update.change.inserted > 0 || update.change.removed > 0 {
                        print_lines(&gallery.render());
                    }
                    if update.new_photos > 0 {
                        println!(
                            "{} new photo{}",
                            update.new_photos,
                            if update.new_photos == 1 { "" } else { "s" }
                        );
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read stdin")? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<Command>() {
                        Ok(Command::Quit) => break,
                        Ok(command) => self.execute(command, &engine, &mut gallery),
                        Err(e) => println!("{} ({})", e, HELP),
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        sync_task.await.context("Sync task panicked")?;
        Ok(())
    }

    async fn run_once(
        engine: &Arc<SyncEngine>,
        events: &mut mpsc::UnboundedReceiver<SyncEvent>,
        gallery: &mut Gallery,
    ) -> Result<()> {
        let outcome = engine.refresh().await;
        while let Ok(event) = events.try_recv() {
            gallery.handle_event(event);
        }

        if let Some(error) = outcome.error() {
            bail!("Sync failed: {}", error);
        }
        print_lines(&gallery.render());
        Ok(())
    }

    fn execute(&mut self, command: Command, engine: &Arc<SyncEngine>, gallery: &mut Gallery) {
        match command {
            Command::More => {
                if gallery.window().has_more(gallery.snapshot()) {
                    gallery.load_more();
                    print_lines(&gallery.render());
                } else {
                    println!("no more photos");
                }
            }
            Command::Scroll(metrics) => {
                if gallery.on_scroll(metrics) > 0 {
                    print_lines(&gallery.render());
                }
            }
            Command::Refresh => {
                let engine = Arc::clone(engine);
                tokio::spawn(async move {
                    let outcome = engine.refresh().await;
                    if !outcome.is_success() {
                        debug!("Manual refresh did not apply: {:?}", outcome);
                    }
                });
            }
            Command::Sort(order) => {
                engine.set_sort_order(order);
                self.settings.sort_order = order;
                self.persist(|stored| stored.sort_order = order);
            }
            Command::Status => {
                let status = engine.status();
                let phase = match status.phase {
                    SyncPhase::Idle => "idle",
                    SyncPhase::Fetching => "fetching",
                    SyncPhase::Reconciling => "reconciling",
                };
                println!(
                    "{} | {} photos ({} visible, batches of {}) | sort {} | every {:?} | generation {}",
                    phase,
                    status.photo_count,
                    gallery.window().len(),
                    gallery.window().config().batch_size,
                    engine.sort_order(),
                    engine.config().effective_interval(),
                    status.applied_generation
                );
                match status.last_success {
                    Some(at) => println!("last success {:?} ago", at.elapsed()),
                    None => println!("no successful sync yet"),
                }
                if let Some(error) = status.last_error {
                    println!("last error: {}", error);
                }
            }
            Command::Urls(id) => match gallery.urls(&id) {
                Some(chain) if chain.is_empty() => println!("{}: no candidate URLs", id),
                Some(chain) if chain.is_exhausted() => {
                    println!("{}: all {} candidates failed", id, chain.len())
                }
                Some(chain) => {
                    let shown = if gallery.window().contains(&id) {
                        ""
                    } else {
                        " (not loaded yet)"
                    };
                    println!("{}: {} candidate(s){}", id, chain.len(), shown);
                    for url in chain {
                        println!("  {}", url);
                    }
                    if let Some(photo) = gallery.snapshot().get(&id) {
                        println!(
                            "  download: {} ({}, {})",
                            photo.urls.download,
                            photo.mime_type.as_deref().unwrap_or("unknown type"),
                            photo
                                .size
                                .map_or_else(|| "unknown size".to_string(), |b| format!("{} bytes", b))
                        );
                    }
                }
                None => println!("no photo with id {}", id),
            },
            Command::NextUrl(id) => match gallery.next_url(&id) {
                Ok(Some(url)) => println!("{}", url),
                Ok(None) => println!("{}: every candidate failed", id),
                Err(e) => println!("{}", e),
            },
            Command::Connect(credentials) => {
                self.settings.connection.api_key = credentials.api_key.clone();
                self.settings.connection.folder_id = credentials.folder_id.clone();
                let connection = self.settings.connection.clone();
                engine.set_credentials(credentials);
                self.persist(|stored| stored.connection = connection);
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    /// Writes one change to the settings file. Environment and command-line
    /// overrides stay out of it.
    fn persist(&self, change: impl FnOnce(&mut Settings)) {
        if let Err(e) = Settings::update(&self.settings_path, change) {
            warn!("Failed to save settings: {:#}", e);
        }
    }
}

impl fmt::Debug for GalleryApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GalleryApp")
            .field("settings_path", &self.settings_path)
            .field("once", &self.once)
            .finish()
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
