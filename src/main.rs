use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::process::ExitCode;

use geotiff_stack::cli::{Args, Command};
use geotiff_stack::store::ensure_absent;
use geotiff_stack::{
    discover_sources, pack_images, reconstruct, tile_store, GdalIo, PackOptions, Result, Selection,
    StackError, TaskPool, TileOptions,
};

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:?} error: {}", err.kind(), err);
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let pool = TaskPool::new(args.threads)?;

    match args.command {
        Command::ConvertImagesToStore {
            root_folder,
            dst,
            file_glob,
            label_glob,
            bands,
        } => {
            ensure_absent(&dst)?;
            let sources = discover_sources(&root_folder, &file_glob, &label_glob)?;
            info!(
                "Found {} images below {}",
                sources.len(),
                root_folder.display()
            );

            let summary = pack_images(&GdalIo, &pool, &sources, &dst, &PackOptions { bands })?;
            info!(
                "Wrote {} rows of {} bands ({}x{}) to {}",
                summary.shape.rows,
                summary.shape.bands,
                summary.shape.width,
                summary.shape.height,
                dst.display()
            );
            info!("Band means: {:?}", summary.img_means);
            info!("Band stds: {:?}", summary.img_stds);
        }
        Command::ConvertStoreToImages {
            src,
            dst_folder,
            index,
        } => {
            if !src.exists() {
                return Err(StackError::SourceNotFound(src));
            }
            let written = reconstruct(
                &GdalIo,
                &pool,
                &src,
                &dst_folder,
                &Selection::from_indices(index),
            )?;
            info!(
                "Wrote {} image/label pairs to {}",
                written.len(),
                dst_folder.display()
            );
        }
        Command::TileStore {
            src,
            dst,
            tile_size,
            overlap,
            target_size,
            chunk_size,
        } => {
            if !src.exists() {
                return Err(StackError::SourceNotFound(src));
            }
            let mut options = TileOptions::new(tile_size, overlap, target_size);
            if let Some(chunk_size) = chunk_size {
                options = options.with_chunk_size(chunk_size);
            }

            let summary = tile_store(&pool, &src, &dst, &options)?;
            info!(
                "Cut {} items into {} tiles each: {} rows written to {}",
                summary.source_rows,
                summary.tiles_per_item,
                summary.shape.rows,
                dst.display()
            );
        }
    }

    info!("=== Done! ===");
    Ok(())
}
