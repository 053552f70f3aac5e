//! Naming helpers shared by models, migrations and code generation

/// `BlogPost` -> `blog_post`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
        } else if c.is_uppercase() {
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

/// `blog_post` -> `BlogPost`
pub fn studly_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// English plural of a lowercase word (last `_` segment only)
pub fn plural(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    };

    let irregular = match last {
        "person" => Some("people"),
        "child" => Some("children"),
        "man" => Some("men"),
        "woman" => Some("women"),
        "mouse" => Some("mice"),
        _ => None,
    };
    if let Some(irregular) = irregular {
        return format!("{}{}", head, irregular);
    }

    let plural = if last.ends_with('y')
        && !last.ends_with("ay")
        && !last.ends_with("ey")
        && !last.ends_with("oy")
        && !last.ends_with("uy")
    {
        format!("{}ies", &last[..last.len() - 1])
    } else if last.ends_with('s')
        || last.ends_with('x')
        || last.ends_with('z')
        || last.ends_with("ch")
        || last.ends_with("sh")
    {
        format!("{}es", last)
    } else {
        format!("{}s", last)
    };
    format!("{}{}", head, plural)
}

/// Inverse of [`plural`] for the common cases
pub fn singular(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    };

    let single = match last {
        "people" => "person".to_string(),
        "children" => "child".to_string(),
        "men" => "man".to_string(),
        "women" => "woman".to_string(),
        "mice" => "mouse".to_string(),
        _ if last.ends_with("ies") => format!("{}y", &last[..last.len() - 3]),
        _ if last.ends_with("ches")
            || last.ends_with("shes")
            || last.ends_with("sses")
            || last.ends_with("xes")
            || last.ends_with("zes") =>
        {
            last[..last.len() - 2].to_string()
        }
        _ if last.ends_with('s') && !last.ends_with("ss") => last[..last.len() - 1].to_string(),
        _ => last.to_string(),
    };
    format!("{}{}", head, single)
}

/// Last path segment of a type name without generics
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}
