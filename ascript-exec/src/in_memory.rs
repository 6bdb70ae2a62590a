use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use sha2::Digest as _;

use crate::error::ExecError;
use crate::math;

/// Dispatches one `CommandKind::InMemory` step by its verb marker (the
/// snake_case strings `ascript-core::compile::verb_marker` stamps into
/// `CompiledCommand.executable`). `arguments` has already had every
/// `$PREV`/capture token filled in by `ExecutionState::substitute`; nothing
/// in this module re-validates a path or URL, since everything it touches
/// was already sandboxed or whitelisted at compile time.
pub async fn dispatch(marker: &str, arguments: &[String], max_output_bytes: usize) -> Result<String, ExecError> {
    match marker {
        "file_read" => file_read(&arguments[0]),
        "file_hash" => file_hash(&arguments[0], &arguments[1]),
        "dir_list" => dir_list(&arguments[0]),
        "dir_tree" => dir_tree(&arguments[0], &arguments[1]),
        "file_write" => file_write(&arguments[0], &arguments[1]),
        "file_append" => file_append(&arguments[0], &arguments[1]),
        "file_copy" => file_copy(&arguments[0], &arguments[1]),
        "file_move" => file_move(&arguments[0], &arguments[1]),
        "file_delete" => file_delete(&arguments[0]),
        "dir_create" => dir_create(&arguments[0]),
        "dir_delete" => dir_delete(&arguments[0]),
        "http_get" => http_get(&arguments[0], max_output_bytes).await,
        "http_post" => http_post(&arguments[0], arguments.get(1).map(String::as_str), max_output_bytes).await,
        "json_get" => json_get(&arguments[0], &arguments[1]),
        "json_set" => json_set(&arguments[0], &arguments[1], &arguments[2]),
        "text_replace" => Ok(arguments[0].replace(arguments[1].as_str(), &arguments[2])),
        "math_eval" => math_eval(&arguments[0]),
        "env_get" => env_get(&arguments[0]),
        "sys_info" => sys_info(&arguments[0]),
        "file_template" => file_template(arguments),
        "file_patch" => file_patch(arguments),
        other => Err(ExecError::StepFailure(format!("no in-memory handler registered for {other:?}"))),
    }
}

fn file_read(path: &str) -> Result<String, ExecError> {
    Ok(std::fs::read_to_string(path)?)
}

fn file_hash(path: &str, algorithm: &str) -> Result<String, ExecError> {
    let bytes = std::fs::read(path)?;
    let digest = match algorithm {
        "sha256" => {
            let mut hasher = sha2::Sha256::new();
            hasher.update(&bytes);
            hex_encode(&hasher.finalize())
        }
        "sha512" => {
            let mut hasher = sha2::Sha512::new();
            hasher.update(&bytes);
            hex_encode(&hasher.finalize())
        }
        "md5" => {
            use md5::Digest as _;
            let mut hasher = md5::Md5::new();
            hasher.update(&bytes);
            hex_encode(&hasher.finalize())
        }
        other => return Err(ExecError::StepFailure(format!("unsupported hash algorithm {other:?}"))),
    };
    Ok(digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn dir_list(path: &str) -> Result<String, ExecError> {
    let mut names: Vec<String> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names.join("\n"))
}

fn dir_tree(path: &str, depth: &str) -> Result<String, ExecError> {
    let max_depth: u32 = depth.parse().map_err(|_| ExecError::StepFailure(format!("invalid depth {depth:?}")))?;
    let mut lines = Vec::new();
    walk_tree(Path::new(path), Path::new(path), max_depth, 0, &mut lines)?;
    lines.sort();
    Ok(lines.join("\n"))
}

fn walk_tree(root: &Path, current: &Path, max_depth: u32, depth: u32, out: &mut Vec<String>) -> Result<(), ExecError> {
    if depth >= max_depth {
        return Ok(());
    }
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
        out.push(relative);
        if path.is_dir() {
            walk_tree(root, &path, max_depth, depth + 1, out)?;
        }
    }
    Ok(())
}

fn file_write(path: &str, content: &str) -> Result<String, ExecError> {
    std::fs::write(path, content)?;
    Ok(format!("wrote {} bytes to {path}", content.len()))
}

fn file_append(path: &str, content: &str) -> Result<String, ExecError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(format!("appended {} bytes to {path}", content.len()))
}

fn file_copy(src: &str, dst: &str) -> Result<String, ExecError> {
    std::fs::copy(src, dst)?;
    Ok(format!("copied {src} to {dst}"))
}

fn file_move(src: &str, dst: &str) -> Result<String, ExecError> {
    std::fs::rename(src, dst)?;
    Ok(format!("moved {src} to {dst}"))
}

fn file_delete(path: &str) -> Result<String, ExecError> {
    std::fs::remove_file(path)?;
    Ok(format!("deleted {path}"))
}

fn dir_create(path: &str) -> Result<String, ExecError> {
    std::fs::create_dir_all(path)?;
    Ok(format!("created {path}"))
}

fn dir_delete(path: &str) -> Result<String, ExecError> {
    std::fs::remove_dir_all(path)?;
    Ok(format!("deleted {path}"))
}

async fn http_get(url: &str, max_output_bytes: usize) -> Result<String, ExecError> {
    let body = reqwest::get(url).await?.text().await?;
    Ok(truncate(body, max_output_bytes))
}

async fn http_post(url: &str, body: Option<&str>, max_output_bytes: usize) -> Result<String, ExecError> {
    let client = reqwest::Client::new();
    let mut request = client.post(url);
    if let Some(body) = body {
        request = request.body(body.to_string());
    }
    let text = request.send().await?.text().await?;
    Ok(truncate(text, max_output_bytes))
}

fn truncate(mut text: String, cap: usize) -> String {
    if text.len() > cap {
        let boundary = (0..=cap).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        text.truncate(boundary);
    }
    text
}

fn json_get(json_text: &str, dot_path: &str) -> Result<String, ExecError> {
    let value: serde_json::Value = serde_json::from_str(json_text)?;
    let found = navigate(&value, dot_path).ok_or_else(|| ExecError::StepFailure(format!("no value at path {dot_path:?}")))?;
    Ok(match found {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn json_set(json_text: &str, dot_path: &str, new_value: &str) -> Result<String, ExecError> {
    let mut value: serde_json::Value = serde_json::from_str(json_text)?;
    let parsed = serde_json::from_str::<serde_json::Value>(new_value).unwrap_or_else(|_| serde_json::Value::String(new_value.to_string()));
    set_path(&mut value, dot_path, parsed)?;
    Ok(serde_json::to_string(&value)?)
}

fn navigate<'a>(value: &'a serde_json::Value, dot_path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in dot_path.split('.') {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.as_array()?.get(index)?
        } else {
            current.as_object()?.get(segment)?
        };
    }
    Some(current)
}

fn as_object_mut(value: &mut serde_json::Value) -> &mut serde_json::Map<String, serde_json::Value> {
    if !value.is_object() {
        *value = serde_json::Value::Object(serde_json::Map::new());
    }
    let serde_json::Value::Object(map) = value else {
        unreachable!("just replaced with an object above")
    };
    map
}

fn set_path(value: &mut serde_json::Value, dot_path: &str, new_value: serde_json::Value) -> Result<(), ExecError> {
    let segments: Vec<&str> = dot_path.split('.').collect();
    let Some((last, ancestors)) = segments.split_last() else {
        return Err(ExecError::StepFailure("json path must not be empty".to_string()));
    };
    let mut current = value;
    for segment in ancestors {
        current = as_object_mut(current).entry(segment.to_string()).or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    }
    as_object_mut(current).insert(last.to_string(), new_value);
    Ok(())
}

fn math_eval(expr: &str) -> Result<String, ExecError> {
    let value = math::evaluate(expr)?;
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Ok(format!("{}", value as i64))
    } else {
        Ok(format!("{value}"))
    }
}

fn env_get(name: &str) -> Result<String, ExecError> {
    if !ascript_sandbox::is_env_var_allowed(name) {
        return Err(ExecError::StepFailure(format!("environment variable {name:?} is not in the allowlist")));
    }
    std::env::var(name).map_err(|_| ExecError::StepFailure(format!("environment variable {name:?} is not set")))
}

fn sys_info(field: &str) -> Result<String, ExecError> {
    use sysinfo::System;
    let mut system = System::new_all();
    system.refresh_all();
    Ok(match field {
        "os" => System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
        "kernel_version" => System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
        "hostname" => System::host_name().unwrap_or_else(|| "unknown".to_string()),
        "cpu_count" => system.cpus().len().to_string(),
        "total_memory_kb" => system.total_memory().to_string(),
        "used_memory_kb" => system.used_memory().to_string(),
        other => return Err(ExecError::StepFailure(format!("unsupported sys_info field {other:?}"))),
    })
}

fn file_template(arguments: &[String]) -> Result<String, ExecError> {
    let source = &arguments[0];
    let dest = &arguments[1];
    let mut values = std::collections::BTreeMap::new();
    for pair in arguments[2..].chunks(2) {
        values.insert(pair[0].clone(), pair[1].clone());
    }
    let raw = std::fs::read_to_string(source)?;
    let rendered = ascript_patch::render_template(&raw, &values)?;
    std::fs::write(dest, &rendered)?;
    Ok(rendered)
}

fn file_patch(arguments: &[String]) -> Result<String, ExecError> {
    let target = &arguments[0];
    let mut patches = Vec::new();
    for pair in arguments[1..].chunks(2) {
        patches.push(ascript_patch::PatchOp { find: pair[0].clone(), replace: pair[1].clone() });
    }
    let original = std::fs::read_to_string(target)?;
    let patched = ascript_patch::apply_patches(&original, &patches)?;
    std::fs::write(target, &patched)?;
    Ok(patched)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt").to_string_lossy().into_owned();
        dispatch("file_write", &[path.clone(), "hello".to_string()], 1024).await.unwrap();
        let read_back = dispatch("file_read", &[path], 1024).await.unwrap();
        assert_eq!(read_back, "hello");
    }

    #[tokio::test]
    async fn file_hash_computes_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt").to_string_lossy().into_owned();
        std::fs::write(&path, "abc").unwrap();
        let digest = dispatch("file_hash", &[path, "sha256".to_string()], 1024).await.unwrap();
        assert_eq!(digest, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[tokio::test]
    async fn json_get_navigates_nested_path() {
        let out = dispatch("json_get", &[r#"{"a":{"b":[1,2,3]}}"#.to_string(), "a.b.1".to_string()], 1024).await.unwrap();
        assert_eq!(out, "2");
    }

    #[tokio::test]
    async fn json_set_creates_intermediate_objects() {
        let out = dispatch("json_set", &["{}".to_string(), "a.b".to_string(), "5".to_string()], 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["a"]["b"], 5);
    }

    #[tokio::test]
    async fn text_replace_replaces_every_occurrence() {
        let out = dispatch("text_replace", &["a-a-a".to_string(), "a".to_string(), "b".to_string()], 1024).await.unwrap();
        assert_eq!(out, "b-b-b");
    }

    #[tokio::test]
    async fn math_eval_formats_whole_numbers_without_a_decimal() {
        let out = dispatch("math_eval", &["2 + 2".to_string()], 1024).await.unwrap();
        assert_eq!(out, "4");
    }

    #[tokio::test]
    async fn math_eval_supports_modulo() {
        let out = dispatch("math_eval", &["7 % 3".to_string()], 1024).await.unwrap();
        assert_eq!(out, "1");
    }

    #[tokio::test]
    async fn env_get_rejects_a_name_outside_the_allowlist() {
        assert!(dispatch("env_get", &["AWS_SECRET_ACCESS_KEY".to_string()], 1024).await.is_err());
    }

    #[tokio::test]
    async fn env_get_reads_an_allowlisted_variable() {
        assert!(dispatch("env_get", &["PATH".to_string()], 1024).await.is_ok());
    }

    #[tokio::test]
    async fn dir_tree_respects_requested_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("deep.txt"), "x").unwrap();
        std::fs::write(dir.path().join("top.txt"), "x").unwrap();
        let out = dispatch("dir_tree", &[dir.path().to_string_lossy().into_owned(), "1".to_string()], 1024).await.unwrap();
        assert!(out.contains("top.txt"));
        assert!(!out.contains("deep.txt"));
    }

    #[tokio::test]
    async fn file_template_renders_and_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.tmpl");
        let dst = dir.path().join("out.txt");
        std::fs::write(&src, "hello {{name}}").unwrap();
        let out = dispatch(
            "file_template",
            &[src.to_string_lossy().into_owned(), dst.to_string_lossy().into_owned(), "name".to_string(), "world".to_string()],
            1024,
        )
        .await
        .unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn file_patch_applies_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.txt");
        std::fs::write(&target, "foo bar").unwrap();
        let out = dispatch("file_patch", &[target.to_string_lossy().into_owned(), "foo".to_string(), "baz".to_string()], 1024).await.unwrap();
        assert_eq!(out, "baz bar");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "baz bar");
    }
}
