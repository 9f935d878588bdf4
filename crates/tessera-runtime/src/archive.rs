//! Unpacking of zipped `Dir` inputs.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rawzip::{CompressionMethod, ZipArchive};

/// Unpack the zip at `zip_path` into `out_dir`, creating it as needed.
///
/// Only stored and deflated members are understood. A member whose name
/// would land outside `out_dir` fails the whole unpack.
pub(crate) fn extract_zip(zip_path: &Path, out_dir: &Path) -> Result<()> {
  let bytes =
    fs::read(zip_path).with_context(|| format!("reading dir archive {}", zip_path.display()))?;
  let archive = ZipArchive::from_slice(&bytes)
    .map_err(|e| anyhow!("{} is not a zip archive: {:?}", zip_path.display(), e))?;
  fs::create_dir_all(out_dir)
    .with_context(|| format!("creating dir input {}", out_dir.display()))?;

  for member in archive.entries() {
    let member = member.map_err(|e| anyhow!("corrupt archive directory: {:?}", e))?;
    let name = member
      .file_path()
      .try_normalize()
      .map_err(|e| anyhow!("undecodable member name: {:?}", e))?
      .as_ref()
      .to_string();
    let dest = member_target(out_dir, &name)?;

    if member.is_dir() {
      fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;
      continue;
    }

    let data = archive
      .get_entry(member.wayfinder())
      .map_err(|e| anyhow!("locating member {}: {:?}", name, e))?
      .data();
    let reader: Box<dyn Read + '_> = match member.compression_method() {
      CompressionMethod::Store => Box::new(data),
      CompressionMethod::Deflate => Box::new(flate2::read::DeflateDecoder::new(data)),
      other => bail!("member {} uses unsupported compression {:?}", name, other),
    };
    write_member(reader, &dest).with_context(|| format!("unpacking member {}", name))?;
  }

  Ok(())
}

/// Where member `name` lands under `out_dir`.
fn member_target(out_dir: &Path, name: &str) -> Result<PathBuf> {
  let relative = Path::new(name);
  let escapes = relative.components().any(|c| {
    matches!(
      c,
      Component::ParentDir | Component::RootDir | Component::Prefix(_)
    )
  });
  if escapes {
    bail!("archive member {} escapes the input directory", name);
  }
  Ok(out_dir.join(relative))
}

fn write_member(mut reader: impl Read, dest: &Path) -> io::Result<u64> {
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }
  let mut file = File::create(dest)?;
  io::copy(&mut reader, &mut file)
}
