use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "geotiff-stack")]
#[command(about = "Pack GeoTIFF image/label pairs into an array store, tile it, and write it back out")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of worker threads (default: all available)
    #[arg(short = 'j', long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stack every image below a folder, with its label, into a new store
    ConvertImagesToStore {
        /// Folder searched recursively for images
        #[arg(short, long, value_name = "DIR")]
        root_folder: PathBuf,

        /// Store to create
        #[arg(short, long, value_name = "DIR")]
        dst: PathBuf,

        /// Glob selecting image files, e.g. "*.tif"
        #[arg(short, long, value_name = "GLOB")]
        file_glob: String,

        /// Glob selecting label files next to each image
        #[arg(short, long, value_name = "GLOB", default_value = "*label*")]
        label_glob: String,

        /// 1-based bands to keep (default: all)
        #[arg(short, long, value_name = "BAND", num_args = 1..)]
        bands: Option<Vec<usize>>,
    },

    /// Write rows of a store back out as GeoTIFF image/label pairs
    ConvertStoreToImages {
        /// Store to read
        #[arg(short, long, value_name = "DIR")]
        src: PathBuf,

        /// Folder receiving the GeoTIFFs
        #[arg(short, long, value_name = "DIR")]
        dst_folder: PathBuf,

        /// 0-based rows to write (default: all)
        #[arg(short, long, value_name = "INDEX", num_args = 0..)]
        index: Option<Vec<usize>>,
    },

    /// Cut every row of a store into overlapping square tiles
    TileStore {
        /// Store to read
        #[arg(short, long, value_name = "DIR")]
        src: PathBuf,

        /// Tiled store to create
        #[arg(short, long, value_name = "DIR")]
        dst: PathBuf,

        /// Tile edge length in pixels
        #[arg(short, long, value_name = "PIXELS")]
        tile_size: usize,

        /// Distance between neighbouring tile origins in pixels
        #[arg(short, long, value_name = "PIXELS")]
        overlap: usize,

        /// Canvas each item is padded or cropped to before tiling
        #[arg(short = 'a', long, value_name = "PIXELS")]
        target_size: usize,

        /// Output rows written per task
        #[arg(short, long, value_name = "ROWS")]
        chunk_size: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_images() {
        let args = Args::parse_from([
            "geotiff-stack",
            "convert-images-to-store",
            "-r",
            "data",
            "-d",
            "out",
            "-f",
            "*.tif",
            "-b",
            "3",
            "2",
            "1",
        ]);
        match args.command {
            Command::ConvertImagesToStore {
                label_glob, bands, ..
            } => {
                assert_eq!(label_glob, "*label*");
                assert_eq!(bands, Some(vec![3, 2, 1]));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_store_to_images_without_index() {
        let args = Args::parse_from([
            "geotiff-stack",
            "convert-store-to-images",
            "-s",
            "store",
            "-d",
            "images",
            "-j",
            "4",
        ]);
        assert_eq!(args.threads, Some(4));
        match args.command {
            Command::ConvertStoreToImages { index, .. } => assert_eq!(index, None),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_tile_store() {
        let args = Args::parse_from([
            "geotiff-stack",
            "tile-store",
            "-s",
            "store",
            "-d",
            "tiles",
            "-t",
            "256",
            "-o",
            "128",
            "-a",
            "1024",
        ]);
        match args.command {
            Command::TileStore {
                tile_size,
                overlap,
                target_size,
                chunk_size,
                ..
            } => {
                assert_eq!((tile_size, overlap, target_size), (256, 128, 1024));
                assert_eq!(chunk_size, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
