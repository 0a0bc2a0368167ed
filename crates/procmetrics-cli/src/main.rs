// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use clap::Parser;
use procmetrics_cli::{run_until, shutdown_signal, Args, Settings};
use procmetrics_observability::init_tracing_with_config;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::resolve(&args)?;

    let logger =
        init_tracing_with_config(settings.log_config()).context("Failed to initialize logging")?;

    run_until(&settings, logger, async {
        if let Err(e) = shutdown_signal().await {
            error!("Failed to listen for shutdown signals: {}", e);
        }
    })
    .await
}
