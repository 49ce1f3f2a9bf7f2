//! Naming conventions: model names (PascalCase) to snake_case table/path names, English plurals
//! for collection paths, and human-readable labels for API docs.

/// Convert an identifier from PascalCase/camelCase to snake_case.
/// e.g. "ProductCategory" -> "product_category", "userId" -> "user_id", "HTTPLog" -> "http_log"
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && !out.ends_with('_') && (prev_lower || (prev_upper && next_lower)) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Pluralise the last word of a snake_case identifier with regular English rules.
/// e.g. "widget" -> "widgets", "product_category" -> "product_categories", "box" -> "boxes"
pub fn pluralize(s: &str) -> String {
    let (head, word) = match s.rfind('_') {
        Some(i) => (&s[..=i], &s[i + 1..]),
        None => ("", s),
    };
    format!("{}{}", head, pluralize_word(word))
}

fn pluralize_word(word: &str) -> String {
    const UNCOUNTABLE: &[&str] = &["data", "equipment", "information", "news", "series", "species"];
    const IRREGULAR: &[(&str, &str)] = &[
        ("person", "people"),
        ("child", "children"),
        ("man", "men"),
        ("woman", "women"),
        ("mouse", "mice"),
    ];
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == word) {
        return plural.to_string();
    }
    let ends_with_consonant_y = word.ends_with('y')
        && word
            .chars()
            .rev()
            .nth(1)
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false);
    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Collection name for a model: used as both URL path segment and table name.
/// e.g. "Widget" -> "widgets", "ProductCategory" -> "product_categories"
pub fn collection_name(model_name: &str) -> String {
    pluralize(&to_snake_case(model_name))
}

/// Human-readable label from a snake_case or PascalCase name.
/// e.g. "ProductCategory" -> "Product category", "created_at" -> "Created at"
pub fn humanize(s: &str) -> String {
    let snake = to_snake_case(s);
    let spaced = snake.replace('_', " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
