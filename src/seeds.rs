//! Built-in question bank so the quiz is usable without external config.

use crate::domain::{Axis, Category, LocalizedText, Question};

pub fn seed_categories() -> Vec<Category> {
  vec![
    Category { key: "energy".into(), title: LocalizedText::new("Social Energy", "社交能量"), axis: Some(Axis::Ei) },
    Category { key: "perception".into(), title: LocalizedText::new("Perception", "感知方式"), axis: Some(Axis::Ns) },
    Category { key: "values".into(), title: LocalizedText::new("Decision Values", "决策取向"), axis: Some(Axis::Ft) },
    Category { key: "structure".into(), title: LocalizedText::new("Life Structure", "生活秩序"), axis: Some(Axis::Pj) },
    Category { key: "meaning".into(), title: LocalizedText::new("Meaning & Cosmos", "意义与宇宙"), axis: None },
  ]
}

fn q(id: &str, category_key: &str, en: &str, zh: &str) -> Question {
  Question { id: id.into(), text: LocalizedText::new(en, zh), category_key: category_key.into() }
}

pub fn seed_questions() -> Vec<Question> {
  vec![
    q("en1", "energy", "A weekend packed with gatherings leaves me recharged.", "一个满是聚会的周末会让我充满活力。"),
    q("en2", "energy", "I think best when I talk ideas through with other people.", "和别人讨论时我的思路最清晰。"),
    q("en3", "energy", "Strangers are simply friends I have not met yet.", "陌生人只是我还没认识的朋友。"),
    q("en4", "energy", "I would rather lead a group discussion than listen quietly.", "比起安静倾听，我更愿意主持小组讨论。"),
    q("en5", "energy", "Long stretches of solitude make me restless.", "长时间独处会让我坐立不安。"),
    q("pe1", "perception", "I am drawn to what could be more than to what is.", "比起现实，我更被可能性所吸引。"),
    q("pe2", "perception", "Patterns and hidden meanings jump out at me everywhere.", "我总能在各处看到规律和隐藏的意义。"),
    q("pe3", "perception", "I trust a hunch even when the facts are thin.", "即使证据不足，我也相信自己的直觉。"),
    q("pe4", "perception", "Abstract theories excite me more than practical manuals.", "抽象理论比实用手册更让我兴奋。"),
    q("pe5", "perception", "I often imagine how the world will look in fifty years.", "我常常想象五十年后的世界。"),
    q("va1", "values", "Keeping harmony matters more to me than winning an argument.", "对我来说，维持和谐比赢得争论更重要。"),
    q("va2", "values", "A decision is right only if it feels right for the people involved.", "只有让相关的人感到妥当的决定才是正确的。"),
    q("va3", "values", "Mercy should sometimes outweigh the rules.", "有时仁慈应当高于规则。"),
    q("va4", "values", "I notice how others feel before I notice what they say.", "我先察觉别人的感受，再注意他们说了什么。"),
    q("va5", "values", "Honesty that hurts is not always worth it.", "伤人的诚实并不总是值得。"),
    q("st1", "structure", "Plans are a starting point, not a promise.", "计划只是起点，不是承诺。"),
    q("st2", "structure", "I enjoy leaving my options open until the last moment.", "我喜欢把选择留到最后一刻。"),
    q("st3", "structure", "A messy desk does not bother me at all.", "杂乱的书桌完全不会困扰我。"),
    q("st4", "structure", "Spontaneous trips beat carefully planned ones.", "说走就走的旅行胜过精心规划的旅行。"),
    q("st5", "structure", "Deadlines are more of a suggestion than a rule.", "截止日期更像是建议而不是规定。"),
    q("me1", "meaning", "Life has a purpose beyond what we choose to give it.", "人生有超越我们自身赋予的意义。"),
    q("me2", "meaning", "Humanity is, on the whole, getting wiser over time.", "总体而言，人类正在变得越来越有智慧。"),
    q("me3", "meaning", "Everything in the universe is connected in some way.", "宇宙中的一切都以某种方式相互关联。"),
    q("me4", "meaning", "Suffering can make a person better.", "苦难能让人变得更好。"),
    q("me5", "meaning", "What we leave behind matters more than what we enjoy now.", "我们留下的东西比眼前的享受更重要。"),
  ]
}
