/// Splits a configured command line such as `"paplay --volume 65536"` into
/// the program and its leading arguments. Returns `None` for blank input.
pub fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(|part| part.to_string());
    let program = parts.next()?;
    Some((program, parts.collect()))
}

pub(crate) fn tail_string(value: &str, max_chars: usize) -> String {
    let count = value.chars().count();
    if count <= max_chars {
        return value.to_string();
    }
    value.chars().skip(count - max_chars).collect()
}
