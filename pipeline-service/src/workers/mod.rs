mod converter;
mod http_converter;
mod passthrough;
mod pool;

pub use converter::{ConversionRequest, Converter, ConverterError};
pub use http_converter::HttpConverter;
pub use passthrough::PassthroughConverter;
pub use pool::{InFlight, WorkerPool};
