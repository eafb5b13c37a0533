// Pipeline ingestion: page fetching and page-data parsing

pub mod fetcher;
pub mod parser;

pub use fetcher::{
    country_page_url, fetch_category_mapping, retry_delay, scrape_countries, CountryScrape,
    HttpPageFetcher, PageFetcher, ScrapeReport, ScrapeStatus, SCRAPE_REPORT_FILE,
};
pub use parser::parse_page_data;
