use std::path::PathBuf;

use clap::Parser;

use crate::utils::version;

#[derive(Parser, Debug, Default)]
#[command(author, version = version(), about)]
pub struct Cli {
    #[arg(short, long, value_name = "N", help = "Items requested by every prepend and append")]
    pub page_size: Option<usize>,

    #[arg(long, value_name = "N", help = "Items requested by the first load")]
    pub initial_load_size: Option<usize>,

    #[arg(long, value_name = "N", help = "Distance from an edge that triggers a prefetch")]
    pub prefetch_distance: Option<usize>,

    #[arg(short = 'n', long, value_name = "N", help = "Number of items the demo source holds")]
    pub total_items: Option<u64>,

    #[arg(long, value_name = "PAGE", help = "Page the first load starts from")]
    pub start_page: Option<u64>,

    #[arg(long, value_name = "N", help = "Fail every Nth load, 0 never fails")]
    pub fail_every: Option<u64>,

    #[arg(long, value_name = "MS", help = "Simulated latency of every load")]
    pub latency_ms: Option<u64>,

    #[arg(short, long, value_name = "N", default_value_t = 50, help = "Number of items to scroll through")]
    pub scroll: usize,

    #[arg(long, value_name = "FILE", help = "Where to save and restore paging state")]
    pub state_file: Option<PathBuf>,
}
