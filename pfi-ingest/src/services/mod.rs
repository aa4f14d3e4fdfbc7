//! Service modules for the profile import pipeline
//!
//! Capabilities (video decoding, text recognition) sit behind traits so the
//! orchestrator can run against the command-line tools or test doubles.

pub mod device_token;
pub mod ffmpeg_video;
pub mod frame_sampler;
pub mod line_merger;
pub mod profile_parse_client;
pub mod tesseract_recognizer;
pub mod text_recognizer;

pub use device_token::{DeviceTokenProvider, FileKeyStore, KeyValueStore, MemoryKeyStore};
pub use ffmpeg_video::FfmpegVideoSource;
pub use frame_sampler::{
    sample_timestamps, FrameSampler, SamplerUpdate, SamplingConfig, VideoSource,
    DEFAULT_FRAME_INTERVAL_SECS,
};
pub use line_merger::{jaccard_similarity, merge_blocks, DEDUP_SIMILARITY_THRESHOLD};
pub use profile_parse_client::{
    ParseClientConfig, ParseProfileRequest, ParsedProfile, ProfileParseClient, ProfilePrompt,
};
pub use tesseract_recognizer::TesseractRecognizer;
pub use text_recognizer::{load_images, RecognitionUpdate, RecognizerAdapter, TextRecognizer};
