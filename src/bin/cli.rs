// Book Database - Personal Book Review Library
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use book_database::query::{BookOrderBy, BookQuery, TaxQuery};
use book_database::storage::models::{BookInput, NewTerm, Order, ReadingEntryInput};
use book_database::storage::{reading, terms, Database, TermFilter};
use book_database::{BookDbConfig, BookDbError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bookdb-cli")]
#[command(about = "Book Database CLI - manage a local book library", long_about = None)]
struct Cli {
    /// SQLite database file (defaults to BOOKDB_DATABASE_PATH, then ./books.db)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a book
    AddBook {
        #[arg(short, long)]
        title: String,
        /// Author name, repeatable
        #[arg(short, long)]
        author: Vec<String>,
        /// Genre name, repeatable
        #[arg(short, long)]
        genre: Vec<String>,
        #[arg(long)]
        series: Option<String>,
        #[arg(long)]
        position: Option<String>,
        /// Publication date, e.g. 1954-07-29
        #[arg(long)]
        pub_date: Option<String>,
        #[arg(long)]
        pages: Option<i64>,
    },
    /// Add a term to a taxonomy
    AddTerm {
        #[arg(short, long)]
        taxonomy: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        slug: Option<String>,
    },
    /// List terms
    ListTerms {
        #[arg(short, long)]
        taxonomy: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        number: i64,
    },
    /// Query books
    Query {
        /// Tax query as JSON
        #[arg(long)]
        tax_query: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long, default_value = "id")]
        orderby: String,
        #[arg(long, default_value = "DESC")]
        order: String,
        #[arg(short, long, default_value_t = 20)]
        number: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Print the JOIN and WHERE fragments generated for a tax query
    Sql {
        /// Tax query as JSON
        tax_query: String,
    },
    /// Log reading progress for a book
    Read {
        #[arg(short, long)]
        book: i64,
        #[arg(long)]
        started: Option<String>,
        #[arg(long)]
        finished: Option<String>,
        #[arg(short, long)]
        percent: Option<i64>,
    },
    /// Show database statistics
    Stats {
        /// Vacuum when more than a fifth of the file is unused
        #[arg(long)]
        vacuum: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        match err.downcast_ref::<BookDbError>() {
            Some(db_err) => {
                eprintln!("Error: {}", db_err.user_message());
                if db_err.is_database_error() {
                    eprintln!("Run `bookdb-cli stats` to check the database file.");
                }
            }
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = open_database(cli.database).await?;

    match cli.command {
        Commands::AddBook {
            title,
            author,
            genre,
            series,
            position,
            pub_date,
            pages,
        } => {
            let mut input = BookInput::new(title).terms("author", author).terms("genre", genre);
            if let Some(series) = series {
                input = input.series(series, position.as_deref());
            }
            if let Some(date) = pub_date {
                input = input.pub_date(date);
            }
            if let Some(pages) = pages {
                input = input.pages(pages);
            }

            let id = book_database::storage::books::save_book(&db, &input)
                .await
                .context("Failed to save book")?;
            println!("Saved book {}", id);
        }
        Commands::AddTerm { taxonomy, name, slug } => {
            let mut term = NewTerm::new(taxonomy, name);
            if let Some(slug) = slug {
                term = term.slug(slug);
            }
            let id = terms::upsert_term(&db, None, &term)
                .await
                .context("Failed to add term")?;
            println!("Saved term {}", id);
        }
        Commands::ListTerms { taxonomy, search, number } => {
            let mut filter = TermFilter::default().number(number).order(Order::Asc).orderby("name");
            if let Some(taxonomy) = taxonomy {
                filter = filter.taxonomy(taxonomy);
            }
            if let Some(search) = search {
                filter = filter.search(search);
            }
            for term in terms::list_terms(&db, &filter).await? {
                println!("{:>5}  {:<10} {} ({}) [{}]", term.id, term.taxonomy, term.name, term.slug, term.count);
            }
        }
        Commands::Query {
            tax_query,
            title,
            author,
            orderby,
            order,
            number,
            offset,
        } => {
            let mut query = BookQuery::new()
                .orderby(BookOrderBy::parse(&orderby))
                .order(Order::parse(&order))
                .number(number)
                .offset(offset);
            if let Some(raw) = tax_query {
                let value = serde_json::from_str(&raw).context("Tax query is not valid JSON")?;
                query = query.tax_query(value);
            }
            if let Some(title) = title {
                query = query.title(title);
            }
            if let Some(author) = author {
                query = query.author_name(author);
            }

            let total = query.count(&db).await?;
            let books = query.fetch(&db).await?;
            println!("{} of {} books", books.len(), total);
            for book in books {
                println!("{}", serde_json::to_string_pretty(&book)?);
            }
        }
        Commands::Sql { tax_query } => {
            let tax = TaxQuery::from_json_str(&tax_query)
                .context("Tax query is not valid JSON")?
                .with_tables(db.tables().clone());
            let catalog = terms::catalog_for(&db, &tax).await?;
            let sql = tax.get_sql("books", "id", &catalog);
            println!("JOIN:{}", sql.join);
            println!("WHERE:{}", sql.where_clause);
        }
        Commands::Read {
            book,
            started,
            finished,
            percent,
        } => {
            let id = reading::insert_reading_entry(
                &db,
                &ReadingEntryInput {
                    book_id: book,
                    date_started: started,
                    date_finished: finished,
                    percentage_complete: percent,
                    ..Default::default()
                },
            )
            .await
            .context("Failed to log reading entry")?;
            println!("Saved reading entry {}", id);
        }
        Commands::Stats { vacuum } => {
            let stats = db.get_stats().await?;
            println!("{:#?}", stats);
            println!("Unused space: {:.1}%", stats.unused_percentage());
            if !db.check_integrity().await? {
                bail!("Database integrity check failed");
            }

            if vacuum {
                if db.vacuum_if_needed().await? {
                    println!("Vacuumed");
                } else {
                    println!("Vacuum not needed");
                }
            } else if stats.should_vacuum() {
                println!("Vacuum recommended, run with --vacuum");
            }
        }
    }

    db.close().await?;
    Ok(())
}

async fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let mut config = BookDbConfig::from_env().context("Invalid BOOKDB_* environment")?;
    if let Some(path) = path {
        config.database_path = Some(path);
    }
    if config.database_path.is_none() {
        config.database_path = Some(PathBuf::from("books.db"));
    }

    Database::open(&config)
        .await
        .with_context(|| format!("Failed to open database {:?}", config.database_path))
}
