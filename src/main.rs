use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use open_music_engine::audio::decoder::FfmpegDecoder;
use open_music_engine::audio::encoder::OpusEncoderFactory;
use open_music_engine::audio::{GuildRegistry, PipelineSettings, StreamingPipeline};
use open_music_engine::config::Config;
use open_music_engine::sources::LocalCacheResolver;
use open_music_engine::transport::{channel, ChannelTransport};

fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_engine=debug".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Engine v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return runtime.block_on(health_check(&config));
    }

    let mut args = std::env::args().skip(1);
    let (Some(guild), refs) = (args.next(), args.collect::<Vec<_>>()) else {
        anyhow::bail!("usage: open-music-engine <guild> <audio-ref>...");
    };
    if refs.is_empty() {
        anyhow::bail!("usage: open-music-engine <guild> <audio-ref>...");
    }

    runtime.block_on(run(config, guild, refs))
}

async fn run(config: Config, guild: String, refs: Vec<String>) -> Result<()> {
    let pipeline = StreamingPipeline::new(
        Arc::new(FfmpegDecoder::new(&config.ffmpeg_path)),
        Arc::new(OpusEncoderFactory::new(config.opus_bitrate)),
        PipelineSettings::from(&config),
    );
    let registry = GuildRegistry::new(
        Arc::new(LocalCacheResolver::new(&config.cache_dir)),
        Arc::new(pipeline),
    );

    let (transport, frames) = ChannelTransport::new(config.frame_buffer);
    let transport = Arc::new(transport);

    let output = config.output_path.clone();
    let writer = tokio::spawn(async move {
        match output {
            Some(path) => {
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?;
                let written = channel::drain_to(frames, &mut file).await?;
                file.sync_all().await?;
                info!("💾 {} frames written to {}", written, path.display());
                anyhow::Ok(written)
            }
            None => {
                let written = channel::drain_to(frames, &mut tokio::io::sink()).await?;
                info!("🔇 {} frames delivered and discarded", written);
                anyhow::Ok(written)
            }
        }
    });

    let requested_by = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    for audio_ref in &refs {
        let enqueued = registry.enqueue(&guild, audio_ref.as_str(), requested_by.as_str());
        info!("📝 [{}] Queue: {:?}", guild, enqueued.snapshot.audio_refs());
    }
    registry.play(&guild, transport.clone())?;

    // Esperar a que la cola termine o a Ctrl+C
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Error al registrar Ctrl+C: {:?}", e);
                }
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                break;
            }
            _ = ticker.tick() => {
                if !registry.is_active(&guild) {
                    info!("🏁 [{}] Queue finished", guild);
                    break;
                }
            }
        }
    }

    registry.stop_all().await;
    drop(registry);
    drop(transport);

    // El writer termina cuando se sueltan todos los senders
    match tokio::time::timeout(Duration::from_secs(2), writer).await {
        Ok(Ok(result)) => {
            result?;
        }
        Ok(Err(e)) => error!("❌ Frame writer failed: {:?}", e),
        Err(_) => warn!("⏱️ Frame writer still busy, exiting anyway"),
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    FfmpegDecoder::new(&config.ffmpeg_path).verify().await?;
    println!("OK");
    Ok(())
}
