use calmline_core::AnswerPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: AnswerPipeline,
    pub indexed_chunks: usize,
}
