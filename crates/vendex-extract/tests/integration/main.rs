mod common;
mod crawl_tests;
mod handshake_tests;
