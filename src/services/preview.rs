use crate::constants::tables;
use crate::domain::EntityKind;
use crate::models::FetchedRecord;
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Writes the rows a dry run would have upserted, one CSV per table:
/// `<dir>/<kind table>.csv` followed by the cast and crew tables of `kind`.
/// Returns the written paths, entity table first.
pub fn write_preview(
    dir: &Path,
    kind: EntityKind,
    records: &[FetchedRecord],
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let paths = match kind {
        EntityKind::Movie => {
            let bundles: Vec<_> = records
                .iter()
                .filter_map(|r| match r {
                    FetchedRecord::Movie(b) => Some(b),
                    FetchedRecord::Tv(_) => None,
                })
                .collect();
            vec![
                write_table(dir, tables::MOVIES, bundles.iter().map(|b| &b.movie))?,
                write_table(dir, tables::MOVIE_CAST, bundles.iter().flat_map(|b| &b.cast))?,
                write_table(dir, tables::MOVIE_CREW, bundles.iter().flat_map(|b| &b.crew))?,
            ]
        }
        EntityKind::Tv => {
            let bundles: Vec<_> = records
                .iter()
                .filter_map(|r| match r {
                    FetchedRecord::Tv(b) => Some(b),
                    FetchedRecord::Movie(_) => None,
                })
                .collect();
            vec![
                write_table(dir, tables::TV_SHOWS, bundles.iter().map(|b| &b.show))?,
                write_table(dir, tables::TV_SHOW_CAST, bundles.iter().flat_map(|b| &b.cast))?,
                write_table(dir, tables::TV_SHOW_CREW, bundles.iter().flat_map(|b| &b.crew))?,
            ]
        }
    };

    Ok(paths)
}

/// The header always comes from the row type, so an empty preview has the
/// same columns as a full one.
fn write_table<'a, T>(dir: &Path, table: &str, rows: impl Iterator<Item = &'a T>) -> Result<PathBuf>
where
    T: Serialize + Default + 'a,
{
    let path = dir.join(format!("{table}.csv"));
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("open {}", path.display()))?;

    wtr.write_record(&header_of::<T>()?)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .with_context(|| format!("write {}", path.display()))?;

    Ok(path)
}

fn header_of<T: Serialize + Default>() -> Result<csv::StringRecord> {
    let mut scratch = csv::Writer::from_writer(Vec::new());
    scratch.serialize(T::default())?;
    let bytes = scratch
        .into_inner()
        .map_err(|e| anyhow!("serialize header: {e}"))?;
    Ok(csv::Reader::from_reader(bytes.as_slice()).headers()?.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::tmdb::{MovieCastMember, MovieCredits, MovieDetails};
    use crate::models::{MovieBundle, MovieRow};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("reelsync_preview_{}", uuid::Uuid::new_v4()))
    }

    fn read(path: &Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        let headers = rdr.headers().unwrap().clone();
        let rows = rdr.records().map(Result::unwrap).collect();
        (headers, rows)
    }

    #[test]
    fn one_line_per_record_plus_credit_tables() {
        let dir = temp_dir();
        let records: Vec<FetchedRecord> = (1..=3)
            .map(|id| {
                FetchedRecord::Movie(MovieBundle::from(MovieDetails {
                    id,
                    title: Some(format!("Title, {id}")),
                    credits: Some(MovieCredits {
                        cast: vec![MovieCastMember {
                            id: 100 + id,
                            character: Some("Lead".into()),
                            ..Default::default()
                        }],
                        crew: Vec::new(),
                    }),
                    ..Default::default()
                }))
            })
            .collect();

        let paths = write_preview(&dir, EntityKind::Movie, &records).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("movies.csv"));

        let (headers, rows) = read(&paths[0]);
        assert_eq!(headers.get(0), Some("id"));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get(1), Some("Title, 1"));

        let (headers, rows) = read(&paths[1]);
        assert!(paths[1].ends_with("movie_cast.csv"));
        assert_eq!(headers.get(0), Some("movie_id"));
        assert_eq!(rows.len(), 3);

        let (_, rows) = read(&paths[2]);
        assert!(rows.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_preview_keeps_full_header() {
        let full = temp_dir();
        let empty = temp_dir();
        let record = FetchedRecord::Movie(MovieBundle::from(MovieDetails {
            id: 1,
            ..Default::default()
        }));

        let with_rows = write_preview(&full, EntityKind::Movie, &[record]).unwrap();
        let without = write_preview(&empty, EntityKind::Movie, &[]).unwrap();

        let (expected, _) = read(&with_rows[0]);
        let (headers, rows) = read(&without[0]);
        assert!(rows.is_empty());
        assert_eq!(headers, expected);
        assert_eq!(headers, header_of::<MovieRow>().unwrap());
        assert!(headers.len() > 2);

        std::fs::remove_dir_all(&full).ok();
        std::fs::remove_dir_all(&empty).ok();
    }
}
