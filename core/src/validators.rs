//! Request field validation. All checks run before anything touches the
//! store; errors are user-facing strings.

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username must not be empty".into());
    }
    if username.chars().count() < 3 {
        return Err("Username must be at least 3 characters".into());
    }
    if username.chars().count() > 50 {
        return Err("Username must be at most 50 characters".into());
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Username may only contain letters, digits and underscores".into());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password must not be empty".into());
    }
    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters".into());
    }
    if password.chars().count() > 100 {
        return Err("Password must be at most 100 characters".into());
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Full name must not be empty".into());
    }
    if name.chars().count() < 2 {
        return Err("Full name must be at least 2 characters".into());
    }
    if name.chars().count() > 100 {
        return Err("Full name must be at most 100 characters".into());
    }
    Ok(())
}

pub fn validate_message(message: &str) -> Result<(), String> {
    if message.trim().is_empty() {
        return Err("Message must not be empty".into());
    }
    if message.chars().count() > 5000 {
        return Err("Message must be at most 5000 characters".into());
    }
    Ok(())
}

pub fn validate_vocab_word(word: &str) -> Result<(), String> {
    if word.trim().is_empty() {
        return Err("Word must not be empty".into());
    }
    if word.chars().count() > 100 {
        return Err("Word must be at most 100 characters".into());
    }
    if !word
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == ' ' || c == '-')
    {
        return Err("Word may only contain letters, spaces and hyphens".into());
    }
    Ok(())
}
