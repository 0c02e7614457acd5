use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{info, warn};

use mulesieve::{checkpoint, cli, config, engine, logging, sink, source, util};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let cfg = loaded.config;
    let format = util::select_format(&cfg, cli_opts.format.as_deref())?;

    let mut options = cfg.engine_options();
    if let Some(kib) = cli_opts.read_size_kib {
        options.read_size = kib.max(1).saturating_mul(1024);
        options.max_buffer_bytes = options.max_buffer_bytes.max(options.read_size);
    }

    util::ensure_output_dir(&cli_opts.output)?;

    let input = source::FileSource::open(&cli_opts.input)
        .with_context(|| format!("opening {}", cli_opts.input.display()))?;

    let state = if cli_opts.resume {
        match cli_opts.checkpoint.as_deref() {
            Some(path) if path.exists() => {
                let saved = checkpoint::load_checkpoint(path)
                    .with_context(|| format!("loading checkpoint {}", path.display()))?;
                saved.check_compatible(&format.id, &loaded.config_hash)?;
                saved.check_input(input.path(), input.len()?, cli_opts.allow_other_input)?;
                info!("resuming from checkpoint saved at {}", saved.saved_at);
                Some(saved.cursor)
            }
            Some(path) => {
                warn!("no checkpoint at {}; starting fresh", path.display());
                None
            }
            None => None,
        }
    } else {
        None
    };

    info!(
        "starting format={} input={} output={} batch_size={} read_size={}",
        format.id,
        input.path().display(),
        cli_opts.output.display(),
        cli_opts.batch_size,
        options.read_size
    );

    let mut engine = engine::ExtractionEngine::from_format(format, input, state, options)?;

    let ctx = sink::OutputContext::new(&format.id, &loaded.config_hash, &cli_opts.input);
    let mut out = sink::build_sink(
        util::backend_from_cli(cli_opts.output_backend),
        &cli_opts.output,
        ctx,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
        })
        .context("installing ctrl-c handler")?;
    }

    let run = util::RunOptions {
        format_id: format.id.clone(),
        config_hash: loaded.config_hash.clone(),
        input_path: cli_opts.input.clone(),
        batch_size: cli_opts.batch_size,
        max_records: cli_opts.max_records,
        checkpoint: cli_opts.checkpoint.clone(),
    };
    let summary = util::run_extraction(&mut engine, &mut out, &run, &shutdown)?;

    info!(
        "mulesieve run finished: {} records written to {}{}",
        summary.records,
        out.dir().display(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}
