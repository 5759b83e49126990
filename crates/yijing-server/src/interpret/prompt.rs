use super::InterpretRequest;
use core::fmt::Write;

/// Position label for reading index `i`, counted 6..1 from the first line.
fn position(i: usize) -> usize {
    yijing::READING_LEN - i
}

/// One `第N爻：…` row per line.
pub fn line_breakdown(request: &InterpretRequest) -> String {
    let mut out = String::new();
    for (i, line) in request.lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "第{}爻：{}", position(i), line.traditional_name());
    }
    out
}

/// The full prompt sent to the text-generation service.
pub fn build_prompt(request: &InterpretRequest) -> String {
    format!(
        "你是一位精通周易的大师。请根据以下信息进行占卜解读：\n\
         \n\
         占卜事项：{matter}\n\
         得到的卦象：{hexagram}\n\
         爻线情况：\n\
         {lines}\n\
         \n\
         请提供：\n\
         1. 对这个卦象的整体解读\n\
         2. 针对占卜事项的具体分析\n\
         3. 实用的建议和行动指南\n\
         \n\
         解读要符合中国传统文化，既要有深度，又要通俗易懂，长度在300字左右。",
        matter = request.matter,
        hexagram = request.hexagram,
        lines = line_breakdown(request),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use yijing::{Line, Reading};

    fn request() -> InterpretRequest {
        InterpretRequest {
            matter: "换工作".into(),
            hexagram: "乾为天".into(),
            lines: Reading::new([
                Line::OldYang,
                Line::YoungYang,
                Line::YoungYin,
                Line::OldYin,
                Line::YoungYang,
                Line::YoungYang,
            ]),
        }
    }

    #[test]
    fn breakdown_counts_down_from_six() {
        let text = line_breakdown(&request());
        let rows: Vec<_> = text.lines().collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], "第6爻：老阳（变爻）");
        assert_eq!(rows[3], "第3爻：老阴（变爻）");
        assert_eq!(rows[5], "第1爻：少阳");
    }

    #[test]
    fn prompt_mentions_matter_and_hexagram() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("占卜事项：换工作"));
        assert!(prompt.contains("得到的卦象：乾为天"));
        assert!(prompt.contains("第4爻：少阴"));
    }
}
