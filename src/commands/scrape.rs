use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::ScrapeArgs;
use crate::db;
use crate::model::{ScrapeCounts, ScrapeRunManifest};
use crate::scrape::discover;
use crate::scrape::extract::{self, QuestionExtractor};
use crate::scrape::fetch::Fetcher;
use crate::store;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

/// Top-level test family attached to every scraped record.
const PROGRAM: &str = "SAT";

pub fn run(args: ScrapeArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("scrape-{}", utc_compact_string(started_ts));

    info!(
        base_url = %args.base_url,
        run_id = %run_id,
        limit = args.limit,
        dry_run = args.dry_run,
        "starting scrape"
    );
    if args.dry_run {
        info!("dry run: parsing without database writes");
    }

    let fetcher = Fetcher::new(Duration::from_millis(args.delay_ms))?;
    let extractor = QuestionExtractor::new()?;
    let mut connection = if args.dry_run {
        None
    } else {
        Some(db::open_database(&args.db_path)?)
    };

    let mut counts = ScrapeCounts::default();

    // Sequential fetch-parse-upsert, one page at a time. A bad page is
    // counted and skipped; only an unreachable category index aborts.
    let urls = discover::question_urls(&fetcher, &args.base_url)?;
    for (index, url) in urls.enumerate() {
        if args.limit != 0 && index >= args.limit {
            break;
        }
        counts.pages_visited += 1;

        let document = match fetcher.fetch(&url) {
            Ok(document) => document,
            Err(err) => {
                warn!(url = %url, error = %err, "skipping unreachable page");
                counts.skipped += 1;
                continue;
            }
        };

        let body_text = extract::flatten_document(&document);
        let Some(parsed) = extractor.parse(&body_text, &url) else {
            warn!(url = %url, "skipping unparsable page");
            counts.skipped += 1;
            continue;
        };

        let Some(connection) = connection.as_mut() else {
            info!(
                section = parsed.section.as_str(),
                number = parsed.sequence_number.unwrap_or_default(),
                url = %url,
                "parsed question"
            );
            continue;
        };

        let record = store::record_from_parsed(&parsed, PROGRAM);
        match store::upsert_question(connection, &record) {
            Ok(true) => {
                counts.created += 1;
                info!(uid = %record.uid, url = %url, "created question");
            }
            Ok(false) => {
                counts.updated += 1;
                info!(uid = %record.uid, url = %url, "updated question");
            }
            Err(err) => {
                warn!(uid = %record.uid, url = %url, error = %err, "failed to persist question");
                counts.skipped += 1;
            }
        }
    }

    let manifest_path = args
        .manifest_dir
        .join(format!("scrape_run_{}.json", utc_compact_string(started_ts)));
    let manifest = ScrapeRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        finished_at: now_utc_string(),
        base_url: args.base_url.clone(),
        db_path: args.db_path.display().to_string(),
        limit: args.limit,
        dry_run: args.dry_run,
        counts,
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote scrape run manifest");

    info!(
        pages_visited = counts.pages_visited,
        created = counts.created,
        updated = counts.updated,
        skipped = counts.skipped,
        "scrape complete"
    );

    Ok(())
}
