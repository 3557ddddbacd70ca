use std::fmt::{self, Write as _};

use crate::models::GeneratedPaper;

const DEFAULT_TITLE: &str = "强化练习卷";
const ANSWER_SPACE_LINES: usize = 3;

/// Plain-text practice sheet for printing: header with name/date/score
/// blanks, numbered questions with lettered options and answer space, and
/// the answer key on its own section at the end.
pub fn render_printable(paper: &GeneratedPaper) -> String {
    let mut out = String::new();
    // Writing into a String never fails.
    write_paper(&mut out, paper).unwrap_or_default();
    out
}

fn write_paper(out: &mut String, paper: &GeneratedPaper) -> fmt::Result {
    let title = if paper.title.trim().is_empty() {
        DEFAULT_TITLE
    } else {
        paper.title.trim()
    };

    writeln!(out, "{}", title)?;
    writeln!(out, "姓名: __________    日期: __________    得分: __________")?;
    writeln!(out)?;

    for (index, question) in paper.questions.iter().enumerate() {
        writeln!(out, "{}. {}", index + 1, question.question)?;
        for (option_index, option) in question.options.iter().flatten().enumerate() {
            writeln!(out, "   {}. {}", option_letter(option_index), option)?;
        }
        for _ in 0..ANSWER_SPACE_LINES {
            writeln!(out)?;
        }
    }

    if paper.questions.is_empty() {
        return Ok(());
    }

    writeln!(out, "参考答案")?;
    for (index, question) in paper.questions.iter().enumerate() {
        writeln!(out, "{}. 答案: {}", index + 1, question.answer)?;
        writeln!(out, "   解析: {}", question.explanation)?;
        writeln!(out, "   考察点: {}", question.knowledge_point)?;
    }
    Ok(())
}

fn option_letter(index: usize) -> char {
    char::from_u32('A' as u32 + index as u32).unwrap_or('?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeneratedQuestion;

    fn paper() -> GeneratedPaper {
        GeneratedPaper {
            title: "分数乘法练习".into(),
            questions: vec![
                GeneratedQuestion {
                    id: "1".into(),
                    question: "1/2 × 6 = ?".into(),
                    options: Some(vec!["2".into(), "3".into(), "4".into()]),
                    answer: "3".into(),
                    explanation: "6 的一半".into(),
                    knowledge_point: "分数乘法".into(),
                    timestamp: None,
                },
                GeneratedQuestion {
                    id: "2".into(),
                    question: "2/3 × 9 = ?".into(),
                    options: None,
                    answer: "6".into(),
                    explanation: "9 的三分之二".into(),
                    knowledge_point: "分数乘法".into(),
                    timestamp: None,
                },
            ],
        }
    }

    #[test]
    fn numbers_questions_and_letters_options() {
        let text = render_printable(&paper());
        assert!(text.starts_with("分数乘法练习\n"));
        assert!(text.contains("1. 1/2 × 6 = ?\n   A. 2\n   B. 3\n   C. 4\n"));
        assert!(text.contains("2. 2/3 × 9 = ?\n"));
        assert!(!text.contains("D."));
    }

    #[test]
    fn answer_key_follows_all_questions() {
        let text = render_printable(&paper());
        let key = text.find("参考答案").unwrap();
        assert!(key > text.find("2. 2/3 × 9 = ?").unwrap());
        assert!(text[key..].contains("2. 答案: 6"));
        assert!(text[key..].contains("考察点: 分数乘法"));
    }

    #[test]
    fn each_question_gets_answer_space() {
        let text = render_printable(&paper());
        assert!(text.contains("   C. 4\n\n\n\n2. 2/3 × 9 = ?"));
    }

    #[test]
    fn untitled_empty_paper_gets_default_header() {
        let text = render_printable(&GeneratedPaper::default());
        assert!(text.starts_with(DEFAULT_TITLE));
        assert!(!text.contains("参考答案"));
    }
}
