use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;

use csv::Writer;
use hashbrown::HashMap;
use log::info;
use serde::Serialize;

use crate::common::{EntityKind, Key, Stowage};
use crate::curator::Curator;
use crate::error::BatchError;
use crate::ra::RoleKind;
use crate::rows::CleanedRow;
use crate::vvi::VenueTree;

pub fn get_writer(path: &Path) -> Result<Writer<File>, BatchError> {
    Ok(Writer::from_path(path)?)
}

#[derive(Serialize)]
struct IdIndexRow<'a> {
    id: &'a str,
    meta: String,
}

#[derive(Serialize)]
struct ArIndexRow {
    meta: String,
    author: String,
    editor: String,
    publisher: String,
}

#[derive(Serialize)]
struct ReIndexRow {
    br: String,
    re: String,
}

#[derive(Serialize)]
struct IssueJs {
    id: String,
}

#[derive(Serialize)]
struct VolumeJs {
    id: String,
    issue: BTreeMap<String, IssueJs>,
}

#[derive(Serialize, Default)]
struct VenueJs {
    volume: BTreeMap<String, VolumeJs>,
    issue: BTreeMap<String, IssueJs>,
}

/// Emit every batch artefact: the five index files, the enriched rows
/// and the structured curation log.
pub fn write_all(stowage: &Stowage, curator: &Curator) -> Result<(), BatchError> {
    write_id_index(
        &stowage.indexes.join("index_id_br.csv"),
        &curator.idmap_br,
    )?;
    write_id_index(
        &stowage.indexes.join("index_id_ra.csv"),
        &curator.idmap_ra,
    )?;
    write_ar_index(&stowage.indexes.join("index_ar.csv"), curator)?;
    write_re_index(&stowage.indexes.join("index_re.csv"), &curator.re_table)?;
    write_vi_index(&stowage.indexes.join("index_vi.json"), &curator.vvi)?;
    write_enriched(&stowage.data.join("enriched.csv"), curator.rows())?;
    write_log(&stowage.logs.join("curation.json"), curator.log())?;
    info!(
        "wrote {} enriched rows and indexes to {:?}",
        curator.rows().len(),
        stowage.indexes.parent().unwrap_or(&stowage.indexes)
    );
    Ok(())
}

fn write_id_index(path: &Path, idmap: &HashMap<String, Key>) -> Result<(), BatchError> {
    let mut pairs: Vec<(&String, &Key)> = idmap.iter().collect();
    pairs.sort();
    let mut wtr = get_writer(path)?;
    for (literal, key) in pairs {
        wtr.serialize(IdIndexRow {
            id: literal,
            meta: key.label(EntityKind::Id),
        })?;
    }
    Ok(wtr.flush()?)
}

fn chain_cell(chain: &[(Key, Key)]) -> String {
    chain
        .iter()
        .map(|(ar, ra)| {
            format!("{}, {}", ar.label(EntityKind::Ar), ra.label(EntityKind::Ra))
        })
        .collect::<Vec<String>>()
        .join("; ")
}

fn write_ar_index(path: &Path, curator: &Curator) -> Result<(), BatchError> {
    let mut brs: Vec<&Key> = curator.ardict.keys().collect();
    brs.sort();
    let mut wtr = get_writer(path)?;
    for br in brs {
        let roles = &curator.ardict[br];
        let cell = |role: RoleKind| {
            roles
                .get(&role)
                .map(|chain| chain_cell(chain))
                .unwrap_or_default()
        };
        wtr.serialize(ArIndexRow {
            meta: br.label(EntityKind::Br),
            author: cell(RoleKind::Author),
            editor: cell(RoleKind::Editor),
            publisher: cell(RoleKind::Publisher),
        })?;
    }
    Ok(wtr.flush()?)
}

fn write_re_index(path: &Path, re_table: &[(Key, crate::common::MetaNum)]) -> Result<(), BatchError> {
    let mut rows: Vec<&(Key, crate::common::MetaNum)> = re_table.iter().collect();
    rows.sort();
    let mut wtr = get_writer(path)?;
    for (br, re_meta) in rows {
        wtr.serialize(ReIndexRow {
            br: br.label(EntityKind::Br),
            re: format!("re/{}", re_meta),
        })?;
    }
    Ok(wtr.flush()?)
}

fn write_vi_index(path: &Path, tree: &VenueTree) -> Result<(), BatchError> {
    let mut out: BTreeMap<String, VenueJs> = BTreeMap::new();
    for (venue, node) in tree.venues() {
        let venue_js = out.entry(venue.label(EntityKind::Br)).or_default();
        for (num, vol) in &node.volumes {
            venue_js.volume.insert(
                num.clone(),
                VolumeJs {
                    id: vol.key.label(EntityKind::Br),
                    issue: vol
                        .issues
                        .iter()
                        .map(|(n, k)| {
                            (
                                n.clone(),
                                IssueJs {
                                    id: k.label(EntityKind::Br),
                                },
                            )
                        })
                        .collect(),
                },
            );
        }
        for (num, key) in &node.issues {
            venue_js.issue.insert(
                num.clone(),
                IssueJs {
                    id: key.label(EntityKind::Br),
                },
            );
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), &out).map_err(io::Error::from)?;
    Ok(())
}

fn write_enriched(path: &Path, rows: &[crate::curator::RowSlot]) -> Result<(), BatchError> {
    let mut wtr = get_writer(path)?;
    for slot in rows {
        wtr.serialize(&slot.row)?;
    }
    Ok(wtr.flush()?)
}

fn write_log(path: &Path, log: &crate::curator::CurationLog) -> Result<(), BatchError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), log).map_err(io::Error::from)?;
    Ok(())
}

/// Read one enriched CSV back; used by tests and the probe command.
pub fn read_enriched(path: &Path) -> Result<Vec<CleanedRow>, BatchError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut out = vec![];
    for rec in rdr.deserialize() {
        let row: CleanedRow = rec?;
        out.push(row);
    }
    Ok(out)
}
