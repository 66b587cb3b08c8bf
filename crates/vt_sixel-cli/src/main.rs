//! vtsix - Encode and decode SIXEL graphics
//!
//! A command-line tool for converting images to/from SIXEL format.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use vt_sixel::{PixelAspectRatio, RenderSettings, SixelImage};

#[derive(Parser)]
#[command(name = "vtsix")]
#[command(version)]
#[command(about = "Encode and decode SIXEL graphics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum AspectArg {
    /// 1:1 square pixels
    Square,
    /// 2:1 vertical stretch
    Double,
    /// 3:1 vertical stretch
    Triple,
    /// 5:1 vertical stretch
    Five,
}

impl From<AspectArg> for PixelAspectRatio {
    fn from(value: AspectArg) -> Self {
        match value {
            AspectArg::Square => PixelAspectRatio::OneToOne,
            AspectArg::Double => PixelAspectRatio::TwoToOne,
            AspectArg::Triple => PixelAspectRatio::ThreeToOne,
            AspectArg::Five => PixelAspectRatio::FiveToOne,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an image to SIXEL format
    Encode {
        /// Input image file (PNG, JPEG, GIF, WebP)
        input: PathBuf,

        /// Output SIXEL file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pixel aspect ratio announced in the stream
        #[arg(short, long, value_enum, default_value = "square")]
        aspect: AspectArg,
    },

    /// Decode a SIXEL file to PNG
    Decode {
        /// Input SIXEL file (use - for stdin)
        input: PathBuf,

        /// Output PNG file (default: input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display an image as SIXEL in the terminal
    Show {
        /// Input image file (PNG, JPEG, GIF, WebP)
        input: PathBuf,

        /// Pixel aspect ratio announced in the stream
        #[arg(short, long, value_enum, default_value = "square")]
        aspect: AspectArg,
    },
}

fn load_image(input: &PathBuf) -> Result<SixelImage, Box<dyn std::error::Error>> {
    let img = image::open(input)
        .map_err(|e| format!("Failed to open '{}': {}", input.display(), e))?;
    let rgba_img = img.to_rgba8();
    let (width, height) = rgba_img.dimensions();
    Ok(SixelImage::from_rgba(
        width as usize,
        height as usize,
        &rgba_img.into_raw(),
    )?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encode {
            input,
            output,
            aspect,
        } => {
            let sixel_image = load_image(&input)?;
            eprintln!(
                "Encoding '{}' ({}x{})",
                input.display(),
                sixel_image.width(),
                sixel_image.height()
            );

            let settings = RenderSettings {
                aspect_ratio: aspect.into(),
                ..Default::default()
            };
            let sixel = sixel_image.encode(&settings)?;

            match output {
                Some(path) => {
                    fs::write(&path, &sixel)?;
                    eprintln!("Written {} bytes to '{}'", sixel.len(), path.display());
                }
                None => {
                    io::stdout().write_all(sixel.as_bytes())?;
                }
            }
        }

        Commands::Decode { input, output } => {
            let sixel_data = if input.to_string_lossy() == "-" {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                fs::read(&input)
                    .map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?
            };

            eprintln!("Decoding ({} bytes)", sixel_data.len());

            let decoded = SixelImage::decode(&sixel_data)?;

            let output_path = output.unwrap_or_else(|| {
                let mut p = input.clone();
                p.set_extension("png");
                p
            });

            let img = image::RgbaImage::from_raw(
                decoded.width() as u32,
                decoded.height() as u32,
                decoded.to_rgba(),
            )
            .ok_or("Failed to create image from decoded data")?;
            img.save(&output_path)?;

            eprintln!(
                "Decoded: {}x{} pixels -> '{}'",
                decoded.width(),
                decoded.height(),
                output_path.display()
            );
        }

        Commands::Show { input, aspect } => {
            let sixel_image = load_image(&input)?;
            let settings = RenderSettings {
                aspect_ratio: aspect.into(),
                ..Default::default()
            };
            print!("{}", sixel_image.encode(&settings)?);
        }
    }

    Ok(())
}
