use std::io::prelude::*;
use std::{
    fs::{create_dir_all, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

pub type MetaNum = u64;

pub const OMID_PREFIX: &str = "https://w3id.org/oc/meta/";

pub const BR: &str = "br";
pub const RA: &str = "ra";
pub const AR: &str = "ar";
pub const RE: &str = "re";
pub const ID: &str = "id";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EntityKind {
    Br,
    Ra,
    Ar,
    Re,
    Id,
}

impl EntityKind {
    pub fn code(&self) -> &'static str {
        match self {
            EntityKind::Br => BR,
            EntityKind::Ra => RA,
            EntityKind::Ar => AR,
            EntityKind::Re => RE,
            EntityKind::Id => ID,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            BR => Some(EntityKind::Br),
            RA => Some(EntityKind::Ra),
            AR => Some(EntityKind::Ar),
            RE => Some(EntityKind::Re),
            ID => Some(EntityKind::Id),
            _ => None,
        }
    }
}

/// Dictionary key: a batch-local placeholder or a stable meta number.
/// The entity kind is implied by the dictionary holding the key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum Key {
    Wannabe(u32),
    Meta(MetaNum),
}

impl Key {
    pub fn is_meta(&self) -> bool {
        matches!(self, Key::Meta(_))
    }

    pub fn meta(&self) -> Option<MetaNum> {
        match self {
            Key::Meta(m) => Some(*m),
            Key::Wannabe(_) => None,
        }
    }

    pub fn label(&self, kind: EntityKind) -> String {
        match self {
            Key::Wannabe(n) => format!("wannabe_{}", n),
            Key::Meta(m) => format!("{}/{}", kind.code(), m),
        }
    }
}

pub fn omid_uri(kind: EntityKind, meta: MetaNum) -> String {
    format!("{}{}/{}", OMID_PREFIX, kind.code(), meta)
}

pub fn parse_omid_uri(uri: &str) -> Option<(EntityKind, MetaNum)> {
    let tail = uri.strip_prefix(OMID_PREFIX)?;
    let mut parts = tail.splitn(2, '/');
    let kind = EntityKind::from_code(parts.next()?)?;
    let meta = parts.next()?.parse::<MetaNum>().ok()?;
    Some((kind, meta))
}

/// "meta:br/12" or "omid:br/12" -> (Br, 12)
pub fn parse_omid_token(token: &str) -> Option<(EntityKind, MetaNum)> {
    let tail = token
        .strip_prefix("meta:")
        .or_else(|| token.strip_prefix("omid:"))?;
    let mut parts = tail.splitn(2, '/');
    let kind = EntityKind::from_code(parts.next()?)?;
    let meta = parts.next()?.parse::<MetaNum>().ok()?;
    Some((kind, meta))
}

macro_rules! pathfields_fn {
    ($($k:ident => $v:literal),*,) => {

        pub fn new(root_path: &str) -> Self{
            $(
                let $k = Path::new(root_path).join($v);
                create_dir_all(&$k).unwrap();
            )*

            Self {
                $(
                    $k,
                )*
            }
        }
    };
}

pub struct Stowage {
    pub store: PathBuf,
    pub counters: PathBuf,
    pub indexes: PathBuf,
    pub data: PathBuf,
    pub logs: PathBuf,
}

impl Stowage {
    pathfields_fn!(
        store => "store",
        counters => "counters",
        indexes => "indexes",
        data => "data",
        logs => "logs",
    );

    pub fn dump_path(&self) -> PathBuf {
        self.store.join("dump.json.gz")
    }
}

pub fn get_gz_buf(file_name: &str) -> io::Result<BufReader<GzDecoder<File>>> {
    let file = File::open(file_name)?;
    let gz_decoder = GzDecoder::new(file);
    Ok(BufReader::new(gz_decoder))
}

pub fn write_gz<T>(out_path: &Path, obj: &T) -> io::Result<()>
where
    T: Serialize,
{
    let out_file = File::create(out_path)?;
    let encoder = GzEncoder::new(out_file, Compression::default());
    let mut writer = io::BufWriter::new(encoder);
    writer.write_all(serde_json::to_string(obj).unwrap().as_bytes())
}

pub fn read_js_path<T: DeserializeOwned>(fp: &str) -> io::Result<T> {
    let mut js_str = String::new();
    get_gz_buf(fp)?.read_to_string(&mut js_str)?;
    let deserializer = &mut serde_json::Deserializer::from_str(&js_str);
    match serde_path_to_error::deserialize(deserializer) {
        Ok(r) => Ok(r),
        Err(err) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {}", fp, err),
        )),
    }
}
