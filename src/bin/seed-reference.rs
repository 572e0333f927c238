/// Load reference data (regions and trend types) from CSV files.
/// Safe to re-run: existing rows are updated in place.
///
/// Usage: seed-reference [--lgas FILE] [--trend-types FILE]
///   --lgas FILE         : CSV with header `id,name,state`
///   --trend-types FILE  : CSV with header `name,description`

use std::collections::HashMap;
use std::hash::Hash;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use tourism_analytics_api::db;

/// Rows per upsert statement; keeps binds under the Postgres limit.
const UPSERT_CHUNK: usize = 1_000;

#[derive(Parser)]
#[command(name = "seed-reference", about = "Upsert regions and trend types from CSV")]
struct Args {
    /// Regions CSV (`id,name,state`)
    #[arg(long)]
    lgas: Option<PathBuf>,

    /// Trend types CSV (`name,description`)
    #[arg(long = "trend-types")]
    trend_types: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct LgaRecord {
    id: i64,
    name: String,
    state: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct TrendTypeRecord {
    name: String,
    #[serde(default)]
    description: String,
}

fn parse_records<T, R>(reader: R) -> anyhow::Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for (i, record) in rdr.deserialize().enumerate() {
        // Line 1 is the header.
        records.push(record.with_context(|| format!("line {}", i + 2))?);
    }
    Ok(records)
}

fn read_file<T: for<'de> Deserialize<'de>>(path: &PathBuf) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_records(file).with_context(|| format!("parsing {}", path.display()))
}

/// Keep the last record for each key, in first-seen order. A single upsert
/// statement cannot touch the same row twice.
fn dedupe_by<T, K, F>(records: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut position: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(&key(&record)) {
            Some(&i) => out[i] = record,
            None => {
                position.insert(key(&record), out.len());
                out.push(record);
            }
        }
    }
    out
}

async fn upsert_lgas(pool: &PgPool, lgas: &[LgaRecord]) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut affected = 0;
    for chunk in lgas.chunks(UPSERT_CHUNK) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO lgas (id, name, state) ");
        qb.push_values(chunk, |mut b, lga| {
            b.push_bind(lga.id).push_bind(&lga.name).push_bind(&lga.state);
        });
        qb.push(" ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, state = EXCLUDED.state");
        affected += qb.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(affected)
}

async fn upsert_trend_types(pool: &PgPool, types: &[TrendTypeRecord]) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut affected = 0;
    for chunk in types.chunks(UPSERT_CHUNK) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO trend_types (name, description) ");
        qb.push_values(chunk, |mut b, t| {
            b.push_bind(&t.name).push_bind(&t.description);
        });
        qb.push(" ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description");
        affected += qb.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(affected)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    if args.lgas.is_none() && args.trend_types.is_none() {
        anyhow::bail!("nothing to do: pass --lgas and/or --trend-types");
    }

    // Parse everything before touching the database.
    let lgas: Vec<LgaRecord> = args.lgas.as_ref().map(read_file).transpose()?.unwrap_or_default();
    let lgas = dedupe_by(lgas, |l| l.id);
    let types: Vec<TrendTypeRecord> =
        args.trend_types.as_ref().map(read_file).transpose()?.unwrap_or_default();
    let types = dedupe_by(types, |t| t.name.clone());

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let n = upsert_lgas(&pool, &lgas).await?;
    tracing::info!("Upserted {} regions", n);
    let n = upsert_trend_types(&pool, &types).await?;
    tracing::info!("Upserted {} trend types", n);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lga_csv_with_whitespace() {
        let data = "id,name,state\n1, Sydney ,NSW\n2,Hobart,TAS\n";
        let lgas: Vec<LgaRecord> = parse_records(data.as_bytes()).unwrap();
        assert_eq!(
            lgas,
            vec![
                LgaRecord { id: 1, name: "Sydney".into(), state: "NSW".into() },
                LgaRecord { id: 2, name: "Hobart".into(), state: "TAS".into() },
            ]
        );
    }

    #[test]
    fn bad_row_reports_its_line() {
        let data = "id,name,state\n1,Sydney,NSW\nx,Hobart,TAS\n";
        let err = parse_records::<LgaRecord, _>(data.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("line 3"));
    }

    #[test]
    fn trend_type_description_may_be_empty() {
        let data = "name,description\noccupancy,\n";
        let types: Vec<TrendTypeRecord> = parse_records(data.as_bytes()).unwrap();
        assert_eq!(types[0].description, "");
    }

    #[test]
    fn repeated_ids_keep_the_last_row() {
        let data = "id,name,state\n1,Sydney,NSW\n2,Hobart,TAS\n1,City of Sydney,NSW\n";
        let lgas = dedupe_by(parse_records::<LgaRecord, _>(data.as_bytes()).unwrap(), |l| l.id);
        assert_eq!(
            lgas,
            vec![
                LgaRecord { id: 1, name: "City of Sydney".into(), state: "NSW".into() },
                LgaRecord { id: 2, name: "Hobart".into(), state: "TAS".into() },
            ]
        );
    }
}
