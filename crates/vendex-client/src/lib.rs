pub mod fetcher;
pub mod ocr;

pub use fetcher::ReqwestFetcher;
pub use ocr::TesseractOcr;
