//! Binary container and draw-data files.
//!
//! Container layout: [`MeshFileHeader`], `Mesh[mesh_count]`, `BoundingBox[mesh_count]`, index
//! bytes, vertex bytes. Every record is written in native byte order straight from memory.
//! Draw-data files are a bare `DrawData` array.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use log::{debug, info};

use crate::draw_data::DrawData;
use crate::mesh_data::MeshData;
use crate::types::{BoundingBox, Mesh, MeshFileHeader, MESH_FILE_MAGIC};
use crate::{Error, Result};

const STREAM: &str = "<stream>";

/// Draw-data file stored next to a container: the container path with `.drawdata` appended.
pub fn draw_data_path(container: impl AsRef<Path>) -> PathBuf {
    let mut path = container.as_ref().as_os_str().to_owned();
    path.push(".drawdata");
    PathBuf::from(path)
}

/// Reads `count` records, growing the buffer only as bytes actually arrive.
fn read_records<T: Pod, R: Read>(reader: &mut R, count: usize, what: &str, origin: &Path) -> Result<Vec<T>> {
    let wanted = (count * std::mem::size_of::<T>()) as u64;
    let mut bytes = Vec::new();
    reader
        .take(wanted)
        .read_to_end(&mut bytes)
        .map_err(|e| Error::io(origin, e))?;
    if (bytes.len() as u64) < wanted {
        return Err(Error::Format(format!(
            "{what}: expected {wanted} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

fn read_header<R: Read>(reader: &mut R, origin: &Path) -> Result<MeshFileHeader> {
    let mut header = MeshFileHeader::zeroed();
    reader
        .read_exact(bytemuck::bytes_of_mut(&mut header))
        .map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::Format("file is shorter than its header".into()),
            _ => Error::io(origin, e),
        })?;
    if header.magic_value != MESH_FILE_MAGIC {
        return Err(Error::Format(format!(
            "bad magic value {:#010x}, expected {MESH_FILE_MAGIC:#010x}",
            header.magic_value
        )));
    }
    for (what, size) in [
        ("index data size", header.index_data_size),
        ("vertex data size", header.vertex_data_size),
    ] {
        if size % 4 != 0 {
            return Err(Error::Format(format!("{what} {size} is not a multiple of 4")));
        }
    }
    Ok(header)
}

/// Total file size the header declares.
fn declared_size(header: &MeshFileHeader) -> u64 {
    let count = header.mesh_count as u64;
    std::mem::size_of::<MeshFileHeader>() as u64
        + count * (std::mem::size_of::<Mesh>() + std::mem::size_of::<BoundingBox>()) as u64
        + header.index_data_size as u64
        + header.vertex_data_size as u64
}

fn read_body<R: Read>(reader: &mut R, header: MeshFileHeader, origin: &Path) -> Result<MeshData> {
    let count = header.mesh_count as usize;
    let meshes = read_records::<Mesh, _>(reader, count, "mesh records", origin)?;
    let boxes = read_records::<BoundingBox, _>(reader, count, "bounding boxes", origin)?;
    let index_data = read_records::<u32, _>(reader, header.index_data_size as usize / 4, "index data", origin)?;
    let vertex_data =
        read_records::<f32, _>(reader, header.vertex_data_size as usize / 4, "vertex data", origin)?;
    let data = MeshData {
        index_data,
        vertex_data,
        meshes,
        boxes,
    };
    data.validate()?;
    Ok(data)
}

/// Reads a container from any byte source.
pub fn read_mesh_data<R: Read>(reader: &mut R) -> Result<(MeshFileHeader, MeshData)> {
    let origin = Path::new(STREAM);
    let header = read_header(reader, origin)?;
    let data = read_body(reader, header, origin)?;
    Ok((header, data))
}

/// Writes a container with a freshly derived header.
pub fn write_mesh_data<W: Write>(writer: &mut W, data: &MeshData) -> Result<MeshFileHeader> {
    write_mesh_data_to(writer, data, Path::new(STREAM))
}

fn write_mesh_data_to<W: Write>(writer: &mut W, data: &MeshData, origin: &Path) -> Result<MeshFileHeader> {
    if data.boxes.len() != data.meshes.len() {
        return Err(Error::Format(format!(
            "{} bounding boxes for {} meshes",
            data.boxes.len(),
            data.meshes.len()
        )));
    }
    let header = data.header()?;
    let write = |writer: &mut W, bytes: &[u8]| writer.write_all(bytes).map_err(|e| Error::io(origin, e));
    write(writer, bytemuck::bytes_of(&header))?;
    write(writer, bytemuck::cast_slice(&data.meshes))?;
    write(writer, bytemuck::cast_slice(&data.boxes))?;
    write(writer, bytemuck::cast_slice(&data.index_data))?;
    write(writer, bytemuck::cast_slice(&data.vertex_data))?;
    Ok(header)
}

/// Loads a container file. Any short or inconsistent file is rejected as a whole.
pub fn load_mesh_data(path: impl AsRef<Path>) -> Result<(MeshFileHeader, MeshData)> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let file_len = file.metadata().map_err(|e| Error::io(path, e))?.len();
    let mut reader = BufReader::new(file);

    let header = read_header(&mut reader, path)?;
    let declared = declared_size(&header);
    if file_len < declared {
        return Err(Error::Format(format!(
            "{} is {file_len} bytes, header declares {declared}",
            path.display()
        )));
    }
    let data = read_body(&mut reader, header, path)?;
    info!(
        "loaded {}: {} meshes, {} indices, {} vertex floats",
        path.display(),
        header.mesh_count,
        data.index_data.len(),
        data.vertex_data.len()
    );
    Ok((header, data))
}

pub fn save_mesh_data(path: impl AsRef<Path>, data: &MeshData) -> Result<MeshFileHeader> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let header = write_mesh_data_to(&mut writer, data, path)?;
    writer.flush().map_err(|e| Error::io(path, e))?;
    debug!(
        "saved {}: {} meshes, data block at {}",
        path.display(),
        header.mesh_count,
        header.data_block_start_offset
    );
    Ok(header)
}

/// Reads a headerless draw-data array until end of input.
pub fn read_draw_data<R: Read>(reader: &mut R) -> Result<Vec<DrawData>> {
    read_draw_data_from(reader, Path::new(STREAM))
}

fn read_draw_data_from<R: Read>(reader: &mut R, origin: &Path) -> Result<Vec<DrawData>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::io(origin, e))?;
    let record = std::mem::size_of::<DrawData>();
    if bytes.len() % record != 0 {
        return Err(Error::Format(format!(
            "draw data is {} bytes, not a multiple of {record}",
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

pub fn write_draw_data<W: Write>(writer: &mut W, rows: &[DrawData]) -> Result<()> {
    writer
        .write_all(bytemuck::cast_slice(rows))
        .map_err(|e| Error::io(STREAM, e))
}

pub fn load_draw_data(path: impl AsRef<Path>) -> Result<Vec<DrawData>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let rows = read_draw_data_from(&mut BufReader::new(file), path)?;
    debug!("loaded {} draw data rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn save_draw_data(path: impl AsRef<Path>, rows: &[DrawData]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, bytemuck::cast_slice::<DrawData, u8>(rows)).map_err(|e| Error::io(path, e))
}
