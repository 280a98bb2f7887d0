/*
    setlist-catalog | Authenticated catalog search for building DJ setlists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::debug;
use setlist_core::{
    http_client, AuthorizationCodeFlow, CatalogClient, CatalogConfig, ConsentError,
    ConsentOutcome, ConsentPrompt, CredentialProvider, SearchQuery, SearchReport, TempoRange,
    Token, TokenEndpoint, PRESET_GENRES,
};
use std::fs::File;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

#[derive(Parser)]
#[command(name = "setlist")]
#[command(about = "Search the track catalog by tempo and genre for your setlists", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Searches the catalog for tracks in a BPM range and genre
    Search {
        /// Lower tempo bound. 0 disables tempo filtering.
        #[arg(long, default_value_t = 120.0)]
        bpm_from: f64,

        /// Upper tempo bound
        #[arg(long, default_value_t = 140.0)]
        bpm_to: f64,

        /// Genre to filter by ("All" disables genre filtering)
        #[arg(long, short = 'g', default_value = "All")]
        genre: String,

        /// Output the results to a JSON file (e.g., --json=tracks.json)
        #[arg(long)]
        json: Option<String>,

        /// Print the request URL without calling the API
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetches an app token with the client-credentials grant
    Token {
        /// Request a second token right after the first to force a new exchange
        #[arg(long)]
        fresh: bool,
    },
    /// Runs the interactive authorization code flow in the terminal
    Authorize,
    /// Lists the preset genres
    Genres,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if dotenv().is_err() {
        // No .env file, environment only
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Search {
            bpm_from,
            bpm_to,
            genre,
            json,
            dry_run,
        } => {
            let query = SearchQuery::new(TempoRange::new(*bpm_from, *bpm_to), genre.as_str());
            handle_search(&query, json.as_deref(), *dry_run).await;
        }
        Commands::Token { fresh } => {
            handle_token(*fresh).await;
        }
        Commands::Authorize => {
            handle_authorize().await;
        }
        Commands::Genres => {
            handle_genres();
        }
    }
}

fn load_config() -> anyhow::Result<CatalogConfig> {
    CatalogConfig::from_env().context("Missing or invalid SETLIST_* configuration")
}

fn get_config() -> CatalogConfig {
    match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {:#}", e);
            process::exit(1);
        }
    }
}

fn get_client() -> CatalogClient {
    match CatalogClient::new(get_config()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error initializing catalog client: {}", e);
            process::exit(1);
        }
    }
}

async fn handle_search(query: &SearchQuery, json_path: Option<&str>, dry_run: bool) {
    let client = get_client();

    if dry_run {
        println!("GET {}", client.search_url(query));
        return;
    }

    let tempo = query.tempo();
    if tempo.is_bounded() {
        println!(
            "Searching {} tracks between {:.0} and {:.0} BPM...",
            query.genre(),
            tempo.lower(),
            tempo.upper()
        );
    } else {
        println!("Searching {} tracks at any tempo...", query.genre());
    }

    match client.search(query).await {
        Ok(tracks) => {
            println!();
            println!("---------------------------------------------------");
            println!("SEARCH RESULTS");
            println!("---------------------------------------------------");
            println!("Genre:         {}", query.genre());
            println!("Tracks Found:  {}", tracks.len());
            println!("---------------------------------------------------");

            if tracks.is_empty() {
                println!();
                println!("No tracks with tempo data matched this search.");
            } else {
                println!();
                for (i, track) in tracks.iter().enumerate() {
                    println!("{}. {}", i + 1, track);
                }
            }

            if let Some(path) = json_path {
                let report = SearchReport {
                    genre: query.genre().to_string(),
                    bpm_from: tempo.is_bounded().then(|| tempo.lower() as u32),
                    bpm_to: tempo.is_bounded().then(|| tempo.upper() as u32),
                    tracks,
                };
                write_report(path, &report);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("Search failed: {}", e);
            if e.is_retryable() {
                eprintln!("(This error is temporary. Try again in a moment.)");
            }
            process::exit(1);
        }
    }
}

fn write_report(path: &str, report: &SearchReport) {
    match File::create(path) {
        Ok(mut file) => {
            let json_content = serde_json::to_string_pretty(report).unwrap_or_default();
            if let Err(e) = file.write_all(json_content.as_bytes()) {
                eprintln!();
                eprintln!("[ERROR] Failed to write report to file: {}", e);
            } else {
                println!();
                println!("[SAVED] Results saved to: {}", path);
            }
        }
        Err(e) => eprintln!("[ERROR] Failed to create file '{}': {}", path, e),
    }
}

async fn handle_token(fresh: bool) {
    let client = get_client();
    let credentials = client.credentials();

    println!("Requesting app token...");
    let first = request_token(credentials).await;
    print_token_window("[OK] Token acquired.", &first, credentials);

    if fresh {
        println!();
        println!("Dropping the cached token and requesting a new one...");
        credentials.invalidate();

        let second = request_token(credentials).await;
        print_token_window("[OK] Fresh token acquired.", &second, credentials);

        if second.secret() == first.secret() {
            println!("(Re-exchanged; the server issued the same token value.)");
        } else {
            println!("(Re-exchanged; the server issued a new token value.)");
        }
    }
}

async fn request_token(credentials: &CredentialProvider) -> Token {
    match credentials.token().await {
        Ok(token) => token,
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Token request failed: {}", e);
            process::exit(1);
        }
    }
}

fn print_token_window(title: &str, token: &Token, credentials: &CredentialProvider) {
    println!();
    println!("{}", title);
    println!("Valid for:     {}s", token.remaining().as_secs());
    println!(
        "Refresh after: {}s",
        token
            .remaining()
            .saturating_sub(credentials.cache().expiry_margin())
            .as_secs()
    );
}

/// Prints the authorization URL and reads the redirect URL back from stdin.
struct TerminalConsent;

#[async_trait]
impl ConsentPrompt for TerminalConsent {
    async fn request_consent(
        &self,
        authorize_url: &Url,
        callback_scheme: &str,
    ) -> Result<ConsentOutcome, ConsentError> {
        println!();
        println!("Open this URL in your browser and approve access:");
        println!();
        println!("   {}", authorize_url);
        println!();
        println!(
            "Then paste the '{}://...' URL you were redirected to (empty line to cancel):",
            callback_scheme
        );

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        let line = line.trim();
        if line.is_empty() {
            return Ok(ConsentOutcome::Cancelled);
        }

        debug!("Received callback URL");
        Ok(ConsentOutcome::Callback(Url::parse(line)?))
    }
}

async fn handle_authorize() {
    let config = Arc::new(get_config());

    let endpoint = match http_client(&config)
        .and_then(|http| TokenEndpoint::new(http, config.clone()))
    {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("Error initializing token endpoint: {}", e);
            process::exit(1);
        }
    };

    let mut flow = AuthorizationCodeFlow::new(config, endpoint);

    match flow.authenticate(&TerminalConsent).await {
        Ok(token) => {
            println!();
            println!("[OK] Authorized.");
            println!("Valid for: {}s", token.remaining().as_secs());
        }
        Err(e) => {
            eprintln!();
            eprintln!("[ERROR] Authorization failed: {}", e);
            process::exit(1);
        }
    }
}

fn handle_genres() {
    println!("Preset genres:");
    for genre in PRESET_GENRES {
        println!("   - {}", genre);
    }
    println!();
    println!("Tip: any other genre works too, e.g. 'setlist search --genre Disco'");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_fresh_flag() {
        let cli = Cli::try_parse_from(["setlist", "token", "--fresh"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { fresh: true }));

        let cli = Cli::try_parse_from(["setlist", "token"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { fresh: false }));
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["setlist", "search"]).unwrap();
        match cli.command {
            Commands::Search {
                bpm_from,
                bpm_to,
                genre,
                json,
                dry_run,
            } => {
                assert_eq!(bpm_from, 120.0);
                assert_eq!(bpm_to, 140.0);
                assert_eq!(genre, "All");
                assert!(json.is_none());
                assert!(!dry_run);
            }
            _ => panic!("Expected search command"),
        }
    }
}
