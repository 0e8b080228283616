//! Prompts sent to language models.
//!
//! Keeping them here makes the instruction contract easy to audit and lets
//! unit tests assert on it without a live model.

/// Fixed instruction for the ingredient classifier.
///
/// The receipt text travels as the only user turn; nothing else in the
/// request varies between invocations. Callers can override it via
/// [`crate::config::AnalysisConfig::system_prompt`].
pub const INGREDIENT_SYSTEM_PROMPT: &str = r#"You are an expert at identifying food ingredients from receipt text.
Extract ONLY food items from the receipt.
Return ONLY a valid JSON array of strings, each string a plain lowercase food name.
Example: ["rice", "kimchi", "garlic"]
Do not wrap the array in markdown code fences.
Do not include prices, quantities, store names, explanations or any additional text."#;

/// Instruction for transcribing a receipt photo with a vision model.
///
/// The placeholder `{languages}` is replaced by [`vision_ocr_prompt`].
const VISION_OCR_TEMPLATE: &str = r#"You are an OCR engine. Transcribe every line of text printed on this store receipt exactly as it appears.
The receipt may contain text in these languages: {languages}.
Keep one receipt line per output line and preserve item names, quantities and prices.
Output ONLY the transcribed text. Do not translate, summarise or comment."#;

/// Build the vision OCR instruction for the given human-readable language list.
pub fn vision_ocr_prompt(languages: &str) -> String {
    VISION_OCR_TEMPLATE.replace("{languages}", languages)
}
