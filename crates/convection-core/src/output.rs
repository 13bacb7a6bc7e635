// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Snapshot Output
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Time-indexed field snapshots in a NumPy `.npz` archive.
//!
//! Layout:
//! - `inputfile`: configuration text as `u8` bytes
//! - `x` `[nx]`, `y` `[ny]`: output-grid cell centres
//! - `time` `[nt]`
//! - `electrons_{k}`, `ions_{k}`, `potential_{k}`, `vorticity_{k}`: `[ny, nx]`
//!   field records for `k < nt`
//!
//! Every snapshot rewrites the archive with one more record. Earlier records
//! are streamed one at a time from the previous archive, so the writer never
//! holds more than the record being copied. Each rewrite goes to a temporary
//! sibling that is then renamed over the target, so readers only ever see
//! complete archives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use convection_types::error::{ConvectionError, ConvectionResult};
use convection_types::state::Grid2D;
use ndarray::{s, Array1, Array2, Array3, Dimension, Ix1, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};

/// Names of the field variables, in record order.
pub const FIELD_NAMES: [&str; 4] = ["electrons", "ions", "potential", "vorticity"];

/// Archive entry holding record `k` of field `name`.
pub fn record_key(name: &str, k: usize) -> String {
    format!("{name}_{k}")
}

/// Appends snapshot records to the archive on disk.
#[derive(Debug)]
pub struct SnapshotWriter {
    path: PathBuf,
    inputfile: Vec<u8>,
    x: Array1<f64>,
    y: Array1<f64>,
    records: usize,
    enabled: bool,
}

impl SnapshotWriter {
    /// Create (or truncate) the archive at `path` with zero records.
    ///
    /// With `enabled == false` (non-root ranks) records are still
    /// counted but nothing touches the filesystem.
    pub fn create<P: AsRef<Path>>(
        path: P,
        inputfile: &str,
        grid_out: &Grid2D,
        enabled: bool,
    ) -> ConvectionResult<Self> {
        let writer = SnapshotWriter {
            path: path.as_ref().to_path_buf(),
            inputfile: inputfile.as_bytes().to_vec(),
            x: grid_out.x.clone(),
            y: grid_out.y.clone(),
            records: 0,
            enabled,
        };
        if writer.enabled {
            writer.rewrite(None)?;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Append one time-tagged record and rewrite the archive.
    ///
    /// `fields` follow [`FIELD_NAMES`] and must have the output-grid shape.
    pub fn append(&mut self, time: f64, fields: [&Array2<f64>; 4]) -> ConvectionResult<()> {
        let shape = (self.y.len(), self.x.len());
        for (name, field) in FIELD_NAMES.iter().zip(fields.iter()) {
            if field.dim() != shape {
                return Err(ConvectionError::GridMismatch(format!(
                    "snapshot field {name}: expected {shape:?}, got {:?}",
                    field.dim()
                )));
            }
        }
        if self.enabled {
            self.rewrite(Some((time, fields)))?;
        }
        self.records += 1;
        Ok(())
    }

    /// Write header, previous records and the optional new record to the
    /// temporary sibling, then move it over the archive.
    fn rewrite(&self, record: Option<(f64, [&Array2<f64>; 4])>) -> ConvectionResult<()> {
        let tmp = self.path.with_extension("npz.tmp");
        {
            let mut previous = match self.records {
                0 => None,
                _ => Some(open_reader(&self.path)?),
            };
            let mut times = match previous.as_mut() {
                Some(npz) => read_array::<f64, Ix1>(npz, "time")?.to_vec(),
                None => Vec::new(),
            };

            let mut npz = NpzWriter::new(File::create(&tmp)?);
            npz.add_array("inputfile", &Array1::from(self.inputfile.clone()))
                .map_err(write_error)?;
            npz.add_array("x", &self.x).map_err(write_error)?;
            npz.add_array("y", &self.y).map_err(write_error)?;

            if let Some(reader) = previous.as_mut() {
                for k in 0..self.records {
                    for name in FIELD_NAMES {
                        let key = record_key(name, k);
                        let field: Array2<f64> = read_array(reader, &key)?;
                        npz.add_array(key, &field).map_err(write_error)?;
                    }
                }
            }
            if let Some((time, fields)) = record {
                for (name, field) in FIELD_NAMES.iter().zip(fields) {
                    npz.add_array(record_key(name, self.records), field)
                        .map_err(write_error)?;
                }
                times.push(time);
            }
            npz.add_array("time", &Array1::from(times)).map_err(write_error)?;
            npz.finish().map_err(write_error)?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::trace!(path = %self.path.display(), records = self.records, "snapshot archive written");
        Ok(())
    }
}

fn write_error(e: ndarray_npy::WriteNpzError) -> ConvectionError {
    ConvectionError::Output(format!("Failed to write npz: {e}"))
}

fn open_reader(path: &Path) -> ConvectionResult<NpzReader<File>> {
    NpzReader::new(File::open(path)?).map_err(|e| {
        ConvectionError::Output(format!("Failed to open npz '{}': {e}", path.display()))
    })
}

/// A snapshot archive read back from disk.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    pub inputfile: String,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub time: Array1<f64>,
    pub electrons: Array3<f64>,
    pub ions: Array3<f64>,
    pub potential: Array3<f64>,
    pub vorticity: Array3<f64>,
}

impl SnapshotArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> ConvectionResult<Self> {
        let mut npz = open_reader(path.as_ref())?;

        let bytes: Array1<u8> = read_array(&mut npz, "inputfile")?;
        let inputfile = String::from_utf8(bytes.to_vec())
            .map_err(|e| ConvectionError::Output(format!("inputfile is not UTF-8: {e}")))?;
        let x: Array1<f64> = read_array(&mut npz, "x")?;
        let y: Array1<f64> = read_array(&mut npz, "y")?;
        let time: Array1<f64> = read_array(&mut npz, "time")?;

        let shape = (time.len(), y.len(), x.len());
        let mut stacked: [Array3<f64>; 4] = std::array::from_fn(|_| Array3::zeros(shape));
        for (name, data) in FIELD_NAMES.iter().zip(stacked.iter_mut()) {
            for k in 0..time.len() {
                let record: Array2<f64> = read_array(&mut npz, &record_key(name, k))?;
                if record.dim() != (shape.1, shape.2) {
                    return Err(ConvectionError::Output(format!(
                        "record {} has shape {:?}, expected {:?}",
                        record_key(name, k),
                        record.dim(),
                        (shape.1, shape.2)
                    )));
                }
                data.slice_mut(s![k, .., ..]).assign(&record);
            }
        }
        let [electrons, ions, potential, vorticity] = stacked;

        Ok(SnapshotArchive {
            inputfile,
            x,
            y,
            time,
            electrons,
            ions,
            potential,
            vorticity,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Field `name` (one of [`FIELD_NAMES`]) at record `k`.
    pub fn field(&self, name: &str, k: usize) -> Option<Array2<f64>> {
        let data = match name {
            "electrons" => &self.electrons,
            "ions" => &self.ions,
            "potential" => &self.potential,
            "vorticity" => &self.vorticity,
            _ => return None,
        };
        (k < data.dim().0).then(|| data.slice(s![k, .., ..]).to_owned())
    }
}

fn read_array<T, D>(npz: &mut NpzReader<File>, key: &str) -> ConvectionResult<ndarray::ArrayBase<OwnedRepr<T>, D>>
where
    T: ndarray_npy::ReadableElement,
    D: Dimension,
{
    npz.by_name::<OwnedRepr<T>, D>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<T>, D>(key))
        .map_err(|e| ConvectionError::Output(format!("Failed to read {key} from npz: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convection_types::state::BoundaryKind;

    fn out_grid() -> Grid2D {
        Grid2D::new(4, 3, 1.0, 1.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic)
    }

    #[test]
    fn test_empty_archive_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.npz");
        let writer = SnapshotWriter::create(&path, "{}", &out_grid(), true).unwrap();
        assert!(writer.is_empty());
        let archive = SnapshotArchive::open(&path).unwrap();
        assert_eq!(archive.len(), 0);
        assert_eq!(archive.electrons.dim(), (0, 3, 4));
        assert_eq!(archive.inputfile, "{}");
    }

    #[test]
    fn test_records_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.npz");
        let grid = out_grid();
        let mut writer = SnapshotWriter::create(&path, "{\"n\": 1}", &grid, true).unwrap();
        for k in 0..3 {
            let n = Array2::from_elem(grid.shape(), k as f64);
            let phi = Array2::from_elem(grid.shape(), -(k as f64));
            let w = grid.zeros();
            writer.append(0.5 * k as f64, [&n, &n, &phi, &w]).unwrap();
        }

        let archive = SnapshotArchive::open(&path).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(archive.time.to_vec(), vec![0.0, 0.5, 1.0]);
        assert_eq!(archive.x, grid.x);
        assert_eq!(archive.field("ions", 2), Some(Array2::from_elem(grid.shape(), 2.0)));
        assert_eq!(archive.field("potential", 1), Some(Array2::from_elem(grid.shape(), -1.0)));
        assert!(archive.field("pressure", 0).is_none());
        assert!(archive.field("electrons", 3).is_none());
        assert!(!path.with_extension("npz.tmp").exists());
    }

    #[test]
    fn test_writer_state_independent_of_record_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.npz");
        let grid = Grid2D::new(64, 64, 1.0, 1.0, BoundaryKind::Dirichlet, BoundaryKind::Periodic);
        let mut writer = SnapshotWriter::create(&path, "{}", &grid, true).unwrap();

        let field = |k: usize| Array2::from_elem(grid.shape(), k as f64);
        let f = field(0);
        writer.append(0.0, [&f, &f, &f, &f]).unwrap();
        let footprint = format!("{writer:?}").len();
        for k in 1..25 {
            let f = field(k);
            writer.append(k as f64, [&f, &f, &f, &f]).unwrap();
        }
        // Only the record counter changes (one more digit)
        assert!(format!("{writer:?}").len() <= footprint + 1);

        let archive = SnapshotArchive::open(&path).unwrap();
        assert_eq!(archive.len(), 25);
        assert_eq!(archive.vorticity.dim(), (25, 64, 64));
        for k in [0, 12, 24] {
            assert_eq!(archive.field("vorticity", k), Some(field(k)));
        }
    }

    #[test]
    fn test_records_stored_as_separate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.npz");
        let grid = out_grid();
        let mut writer = SnapshotWriter::create(&path, "", &grid, true).unwrap();
        let f = grid.zeros();
        writer.append(0.0, [&f, &f, &f, &f]).unwrap();
        writer.append(1.0, [&f, &f, &f, &f]).unwrap();

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let names = npz.names().unwrap();
        for name in FIELD_NAMES {
            for k in 0..2 {
                let key = record_key(name, k);
                assert!(names.iter().any(|n| n == &key || n == &format!("{key}.npy")), "{key}");
            }
        }
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let grid = out_grid();
        let mut writer = SnapshotWriter::create(dir.path().join("a.npz"), "", &grid, true).unwrap();
        let bad = Array2::zeros((2, 2));
        let good = grid.zeros();
        assert!(writer.append(0.0, [&good, &good, &bad, &good]).is_err());
        assert!(writer.is_empty());
    }

    #[test]
    fn test_disabled_writer_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skipped.npz");
        let grid = out_grid();
        let mut writer = SnapshotWriter::create(&path, "", &grid, false).unwrap();
        let f = grid.zeros();
        writer.append(0.0, [&f, &f, &f, &f]).unwrap();
        assert_eq!(writer.len(), 1);
        assert!(!path.exists());
    }
}
