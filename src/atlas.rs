//! Session context: the world, its layers, and the lock that guards them.
//!
//! All layer state lives behind one `parking_lot::RwLock`. Sampling takes the
//! shared side, every mutation (named parameters, palette strings, committed
//! edits) takes the exclusive side. A reader therefore never sees a half-applied
//! parameter set, and once a mutation returns every later read observes it.
//!
//! Full-globe buffers can be precomputed on dedicated worker threads, never on
//! the rayon pool that layers use for their own parallel fills, since a worker
//! waiting on the lock must not take a pool thread away from the lock holder.
//! Each layer keeps at most one finished result; a newer one replaces it, and a
//! result is dropped when a newer request for the same layer, or any mutation,
//! has superseded it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use image::RgbaImage;
use parking_lot::{Mutex, RwLock};

use crate::cache::CacheStats;
use crate::config::AtlasConfig;
use crate::delta::LayerDelta;
use crate::error::Result;
use crate::geo::GeoRegion;
use crate::layers::{LayerContext, LayerKind, LayerSet, RegionRequest, SampleData};
use crate::tilemap::{Interpolation, Tilemap};
use crate::world::World;

/// A finished background computation.
#[derive(Debug)]
pub struct Precomputed {
    pub kind: LayerKind,
    pub ticket: u64,
    pub image: Result<Arc<RgbaImage>>,
    revision: u64,
}

/// Shared handle to one editing session. Clones refer to the same state.
#[derive(Clone)]
pub struct Atlas {
    world: Arc<World>,
    layers: Arc<RwLock<LayerSet>>,
    revision: Arc<AtomicU64>,
    tickets: Arc<[AtomicU64; LayerKind::COUNT]>,
    /// Latest finished result per layer.
    ready: Arc<Mutex<[Option<Precomputed>; LayerKind::COUNT]>>,
    /// Wakeup for waiters; holds at most one pending signal.
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
    raster_budget: u64,
}

impl Atlas {
    pub fn new(config: &AtlasConfig) -> Result<Self> {
        config.validate()?;
        let world = config.world()?;
        let layers = LayerSet::new(&world, config)?;
        let (notify_tx, notify_rx) = bounded(1);
        tracing::info!(
            seed = world.seed(),
            width = world.native_resolution().x,
            height = world.native_resolution().y,
            "atlas created"
        );
        Ok(Self {
            world: Arc::new(world),
            layers: Arc::new(RwLock::new(layers)),
            revision: Arc::new(AtomicU64::new(0)),
            tickets: Arc::new(Default::default()),
            ready: Arc::new(Mutex::new(Default::default())),
            notify_tx,
            notify_rx,
            raster_budget: config.raster_budget_pixels,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Number of successful mutations so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Pixel budget for projection rasters.
    pub fn raster_budget(&self) -> u64 {
        self.raster_budget
    }

    /// Run `f` with shared access to every layer.
    pub fn read<R>(&self, f: impl FnOnce(&LayerContext<'_>) -> R) -> R {
        let layers = self.layers.read();
        let ctx = LayerContext {
            world: &self.world,
            layers: &layers,
        };
        f(&ctx)
    }

    pub fn sample(&self, kind: LayerKind) -> Result<Arc<Tilemap<f32>>> {
        self.read(|ctx| ctx.layers.get(kind).sample(ctx))
    }

    pub fn get_color(&self, kind: LayerKind) -> Result<Arc<RgbaImage>> {
        self.read(|ctx| ctx.layers.get(kind).get_color(ctx))
    }

    pub fn sample_point(&self, kind: LayerKind, lon: f64, lat: f64) -> Result<SampleData> {
        self.read(|ctx| ctx.layers.get(kind).sample_point(ctx, lon, lat))
    }

    pub fn supports_region(&self, kind: LayerKind) -> bool {
        self.read(|ctx| ctx.layers.get(kind).supports_region())
    }

    /// How the layer's full-globe buffer is read between pixels.
    pub fn interpolation(&self, kind: LayerKind) -> Interpolation {
        self.read(|ctx| ctx.layers.get(kind).interpolation())
    }

    /// Scalar values inside a window. `delta` applies to this call only.
    pub fn sample_region(
        &self,
        kind: LayerKind,
        region: GeoRegion,
        res_x: usize,
        res_y: usize,
        delta: Option<&LayerDelta>,
    ) -> Result<Arc<Tilemap<f32>>> {
        let request = RegionRequest::new(region, res_x, res_y, delta)?;
        self.read(|ctx| ctx.layers.get(kind).sample_region(ctx, &request))
    }

    pub fn get_color_region(
        &self,
        kind: LayerKind,
        region: GeoRegion,
        res_x: usize,
        res_y: usize,
        delta: Option<&LayerDelta>,
    ) -> Result<Arc<RgbaImage>> {
        let request = RegionRequest::new(region, res_x, res_y, delta)?;
        self.read(|ctx| ctx.layers.get(kind).get_color_region(ctx, &request))
    }

    pub fn cache_stats(&self, kind: LayerKind) -> CacheStats {
        self.read(|ctx| ctx.layers.get(kind).cache_stats())
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Set one named scalar. `Ok(false)` for names the layer does not know.
    pub fn set_parameter(&self, kind: LayerKind, name: &str, value: f64) -> Result<bool> {
        let mut layers = self.layers.write();
        let applied = layers.set_parameter(kind, name, value)?;
        if applied {
            self.bump_revision();
        }
        Ok(applied)
    }

    pub fn parse_parameters(&self, kind: LayerKind, params: &str) -> Result<()> {
        let mut layers = self.layers.write();
        layers.parse_parameters(kind, params)?;
        self.bump_revision();
        Ok(())
    }

    pub fn commit_delta(&self, kind: LayerKind, delta: LayerDelta) -> Result<()> {
        let mut layers = self.layers.write();
        layers.commit_delta(kind, delta)?;
        self.bump_revision();
        Ok(())
    }

    pub fn clear_edits(&self, kind: LayerKind) -> bool {
        let mut layers = self.layers.write();
        let cleared = layers.clear_edits(kind);
        if cleared {
            self.bump_revision();
        }
        cleared
    }

    /// Drop every cached buffer of every layer.
    pub fn invalidate_all(&self) {
        self.layers.read().invalidate_all();
        tracing::info!("all layer caches invalidated");
    }

    /// Compute a layer's full-globe colors on a worker thread. Returns the
    /// ticket that identifies this request; a later request for the same layer
    /// supersedes it.
    pub fn precompute(&self, kind: LayerKind) -> u64 {
        let ticket = self.tickets[kind.index()].fetch_add(1, Ordering::AcqRel) + 1;
        let revision = self.revision();
        let atlas = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("precompute-{}", kind))
            .spawn(move || atlas.run_precompute(kind, ticket, revision));
        if let Err(e) = spawned {
            tracing::warn!(layer = %kind, ticket, error = %e, "failed to start precompute worker");
        }
        ticket
    }

    fn run_precompute(&self, kind: LayerKind, ticket: u64, revision: u64) {
        if self.tickets[kind.index()].load(Ordering::Acquire) != ticket {
            tracing::debug!(layer = %kind, ticket, "precompute superseded before start");
            return;
        }
        let image = self.get_color(kind);
        tracing::info!(layer = %kind, ticket, ok = image.is_ok(), "precompute finished");
        let result = Precomputed {
            kind,
            ticket,
            image,
            revision,
        };
        if !self.is_current(&result) {
            return;
        }
        self.ready.lock()[kind.index()] = Some(result);
        // A full channel means a wakeup is already pending.
        let _ = self.notify_tx.try_send(());
    }

    fn is_current(&self, result: &Precomputed) -> bool {
        let latest = self.tickets[result.kind.index()].load(Ordering::Acquire);
        if result.ticket != latest {
            tracing::warn!(layer = %result.kind, ticket = result.ticket, latest, "dropping superseded precompute");
            return false;
        }
        if result.revision != self.revision() {
            tracing::warn!(layer = %result.kind, ticket = result.ticket, "dropping precompute from before a mutation");
            return false;
        }
        true
    }

    /// Take the first held result that is still current, discarding stale ones.
    fn take_current(&self) -> Option<Precomputed> {
        let mut ready = self.ready.lock();
        for slot in ready.iter_mut() {
            if let Some(result) = slot.take() {
                if self.is_current(&result) {
                    return Some(result);
                }
            }
        }
        None
    }

    /// Drain finished background results, keeping only current ones.
    pub fn poll_precomputed(&self) -> Vec<Precomputed> {
        std::iter::from_fn(|| self.take_current()).collect()
    }

    /// Block until a current background result arrives or `timeout` elapses.
    pub fn wait_precomputed(&self, timeout: Duration) -> Option<Precomputed> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.take_current() {
                return Some(result);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.notify_rx.recv_timeout(remaining).is_err() {
                return None;
            }
        }
    }
}
