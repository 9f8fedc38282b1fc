//! Converts OBJ scenes into Lume mesh containers and merges containers.
//!
//! ```text
//! meshconvert convert scene.obj scene.meshes -t -n -l --scale 0.01
//! meshconvert merge all.meshes a.meshes b.meshes
//! ```
//! Each container is accompanied by `<container>.drawdata`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use lume_mesh::{
    build_draw_data, draw_data_path, load_draw_data, load_mesh_data, merge_draw_data,
    save_draw_data, save_mesh_data, DrawData, MeshData,
};
use lume_tools::{convert_file, ConvertOptions, LodOptions};

#[derive(Parser, Debug)]
#[command(name = "meshconvert", about = "Lume mesh container converter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an OBJ file into a container and its default draw data.
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Export texture coordinates.
        #[arg(short = 't', long = "export-texcoords")]
        tex_coords: bool,
        /// Export normals.
        #[arg(short = 'n', long = "export-normals")]
        normals: bool,
        /// Generate LOD chains.
        #[arg(short = 'l', long = "lods")]
        lods: bool,
        /// Uniform scale applied to positions.
        #[arg(long, default_value_t = 0.01)]
        scale: f32,
    },
    /// Merge containers (and their draw data) into one.
    Merge {
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn convert(input: &Path, output: &Path, options: ConvertOptions) -> lume_mesh::Result<()> {
    info!("loading '{}'", input.display());
    let (data, draw_data) = convert_file(input, options)?;
    let header = save_mesh_data(output, &data)?;
    let rows_path = draw_data_path(output);
    save_draw_data(&rows_path, &draw_data)?;
    info!(
        "wrote '{}' ({} meshes, {} index bytes, {} vertex bytes) and '{}' ({} rows)",
        output.display(),
        header.mesh_count,
        header.index_data_size,
        header.vertex_data_size,
        rows_path.display(),
        draw_data.len()
    );
    Ok(())
}

fn merge(output: &Path, inputs: &[PathBuf]) -> lume_mesh::Result<()> {
    let mut parts: Vec<(MeshData, Vec<DrawData>)> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (_, data) = load_mesh_data(input)?;
        let rows_path = draw_data_path(input);
        let draw_data = if rows_path.exists() {
            load_draw_data(&rows_path)?
        } else {
            warn!("'{}' not found, using one row per mesh", rows_path.display());
            build_draw_data(&data)
        };
        for row in &draw_data {
            row.validate(&data.meshes)?;
        }
        parts.push((data, draw_data));
    }

    let containers: Vec<&MeshData> = parts.iter().map(|(data, _)| data).collect();
    let merged = MeshData::merge(&containers)?;
    let tables: Vec<(&MeshData, &[DrawData])> = parts
        .iter()
        .map(|(data, rows)| (data, rows.as_slice()))
        .collect();
    let draw_data = merge_draw_data(&tables)?;
    merged.validate()?;

    let header = save_mesh_data(output, &merged)?;
    save_draw_data(draw_data_path(output), &draw_data)?;
    info!(
        "merged {} containers into '{}': {} meshes, {} draw rows",
        inputs.len(),
        output.display(),
        header.mesh_count,
        draw_data.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Convert {
            input,
            output,
            tex_coords,
            normals,
            lods,
            scale,
        } => convert(
            &input,
            &output,
            ConvertOptions {
                tex_coords,
                normals,
                scale,
                generate_lods: lods,
                lod: LodOptions::default(),
            },
        ),
        Command::Merge { output, inputs } => merge(&output, &inputs),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
