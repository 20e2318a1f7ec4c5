//! Drives the frame engine against offscreen wgpu targets.
//!
//! Usage: `parallax-headless [--frames N] [--fallback] [--exclusive]`

mod scene;

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use glam::{DMat4, DVec3};
use parallax_engine::device::{GpuInit, WgpuBackend};
use parallax_engine::logging::{LoggingConfig, init_logging};
use parallax_engine::view::ViewPolicy;
use parallax_engine::{
    CleanupTarget, EngineConfig, ErrorListener, FrameExecutionEngine, PixelRect, RenderHooks,
    RenderRequest, Surface, SurfaceConfig, SurfaceId,
};

use crate::scene::TriangleScene;

#[derive(Debug)]
struct Args {
    frames: u32,
    fallback: bool,
    shared: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        frames: 4,
        fallback: false,
        shared: true,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--frames" => {
                let value = it.next().context("--frames needs a value")?;
                args.frames = value
                    .parse()
                    .with_context(|| format!("invalid frame count `{value}`"))?;
            }
            "--fallback" => args.fallback = true,
            "--exclusive" => args.shared = false,
            other => bail!("unknown argument `{other}`"),
        }
    }
    Ok(args)
}

/// Counts presented frames of one surface.
#[derive(Default)]
struct PresentCounter {
    presented: u64,
}

impl RenderHooks for PresentCounter {
    fn post_swap(&mut self, surface: SurfaceId) -> Result<()> {
        self.presented += 1;
        log::debug!("{surface}: presented frame {}", self.presented);
        Ok(())
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let args = parse_args()?;

    let backend = WgpuBackend::new(GpuInit {
        force_fallback_adapter: args.fallback,
        ..GpuInit::default()
    });
    let config = EngineConfig {
        prefer_shared_context: args.shared,
        ..EngineConfig::default()
    };
    let (listener, errors) = ErrorListener::channel();
    let engine = FrameExecutionEngine::spawn(config, backend, TriangleScene::new(), Some(listener))?;

    let stereo = Surface::new(SurfaceConfig {
        rect: PixelRect::from_size(320, 240),
        stereo_capable: true,
        policy: ViewPolicy {
            stereo_enable: true,
            scene_antialiasing: true,
            ..ViewPolicy::default()
        },
        ..SurfaceConfig::default()
    });
    let mono = Surface::new(SurfaceConfig {
        rect: PixelRect::from_size(320, 240),
        ..SurfaceConfig::default()
    });
    stereo.set_hooks(PresentCounter::default());
    mono.set_hooks(PresentCounter::default());

    let surfaces = [Arc::clone(&stereo), Arc::clone(&mono)];
    for frame in 0..args.frames {
        let yaw = f64::from(frame) * 0.15;
        let platform = DMat4::from_rotation_y(yaw) * DMat4::from_translation(DVec3::new(0.0, 0.0, 0.1));
        for surface in &surfaces {
            surface.set_view_platform_transform(platform);
        }

        let outcome = engine
            .post(RenderRequest::render(surfaces.iter().cloned()))?
            .wait()?;
        log::info!(
            "frame {frame}: {} drawn, {} skipped, {} failed",
            outcome.completed.len(),
            outcome.skipped.len(),
            outcome.failed.len()
        );
    }

    let mut failures = 0;
    while let Ok(event) = errors.try_recv() {
        failures += 1;
        log::error!("{:?} failure: {}", event.kind, event.error);
    }

    engine
        .post(RenderRequest::Cleanup(CleanupTarget::All))?
        .wait()?;
    engine.shutdown()?;

    if failures > 0 {
        bail!("{failures} surface(s) failed");
    }
    log::info!("done");
    Ok(())
}
