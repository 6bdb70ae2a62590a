use std::path::Path;

use ascript_protocol::CommandKind;
use ascript_protocol::CompiledCommand;
use ascript_protocol::CompiledScript;
use ascript_protocol::CompiledStep;
use ascript_protocol::CompileError;
use ascript_protocol::CompileErrorKind;
use ascript_protocol::Script;
use ascript_protocol::Verb;
use ascript_protocol::WorkspaceContext;
use ascript_sandbox::CommandWhitelist;

use crate::capture;
use crate::expand;
use crate::label;
use crate::resolve;
use crate::resolve::ResolvedOp;

/// Hash digests the host is willing to compute for `FileHash` (§4.9).
pub const ALLOWED_HASH_ALGORITHMS: &[&str] = &["sha256", "sha512", "md5"];
/// Default/maximum recursion depth for `DirTree` when the script omits or
/// overrides the second argument.
pub const DIR_TREE_DEFAULT_DEPTH: u32 = 3;
pub const DIR_TREE_MAX_DEPTH: u32 = 5;
/// `FileTemplate` may bind at most this many substitution keys.
pub const MAX_TEMPLATE_KEYS: usize = 64;
/// `FilePatch` may apply at most this many find/replace pairs per step.
pub const MAX_PATCHES: usize = 32;
/// `MathEval` expressions are capped at this length and restricted to a
/// small arithmetic charset; it is evaluated in-process, never shelled out.
pub const MAX_MATH_EXPR_LEN: usize = 256;
const MATH_EXPR_CHARS: &str = "0123456789+-*/%(). ";

/// Turns a validated `Script` into a `CompiledScript` ready for
/// `ascript-exec` (§3, §4.9). Runs the full pipeline in order: expand,
/// analyze captures, validate labels, resolve variables, then compile each
/// resolved step; any failure at any stage aborts with no partial script.
pub fn compile_script(
    script: &Script,
    workspace: WorkspaceContext,
    whitelist: &CommandWhitelist,
    allow_plain_http: bool,
) -> Result<CompiledScript, CompileError> {
    let (expanded_main, expanded_cleanup) = expand::expand_script(script)?;
    let captures = capture::analyze_captures(&expanded_main, &expanded_cleanup)?;
    let label_index = label::validate_labels(&expanded_main, &expanded_cleanup)?;
    let (resolved_main, resolved_cleanup) =
        resolve::resolve_script(&expanded_main, &expanded_cleanup, &workspace, &captures)?;

    let effective_options = script.effective_options();
    let sandbox_root = workspace.sandbox_root.clone();

    let steps = compile_list(&resolved_main, &sandbox_root, whitelist, allow_plain_http, &effective_options)?;
    let cleanup_steps = compile_list(&resolved_cleanup, &sandbox_root, whitelist, allow_plain_http, &effective_options)?;

    Ok(CompiledScript { steps, cleanup_steps, effective_options, workspace, label_index })
}

fn compile_list(
    ops: &[ResolvedOp],
    sandbox_root: &Path,
    whitelist: &CommandWhitelist,
    allow_plain_http: bool,
    options: &ascript_protocol::ExecutionOptions,
) -> Result<Vec<CompiledStep>, CompileError> {
    ops.iter()
        .enumerate()
        .map(|(step_index, resolved)| compile_step(resolved, step_index, sandbox_root, whitelist, allow_plain_http, options))
        .collect()
}

fn compile_step(
    resolved: &ResolvedOp,
    step_index: usize,
    sandbox_root: &Path,
    whitelist: &CommandWhitelist,
    allow_plain_http: bool,
    options: &ascript_protocol::ExecutionOptions,
) -> Result<CompiledStep, CompileError> {
    let op = &resolved.operation;
    check_arity(op, step_index)?;

    let requested_args = op.args.clone();
    let command = build_command(op, step_index, sandbox_root, whitelist, allow_plain_http)?;

    ascript_sandbox::scan_all(command.arguments.iter().map(String::as_str)).map_err(|e| {
        CompileError::new(op.verb, step_index, CompileErrorKind::GigaBlacklistViolation, e.to_string())
    })?;

    Ok(CompiledStep {
        step_index,
        verb: op.verb,
        command,
        max_retries: op.max_retries.unwrap_or(options.max_retries),
        step_timeout_ms: op.step_timeout_ms.unwrap_or(options.step_timeout_ms),
        capture_as: op.capture_as.clone(),
        on_failure: op.on_failure.clone(),
        requested_args,
        guard: resolved.guard.clone(),
    })
}

fn check_arity(op: &ascript_protocol::Operation, step_index: usize) -> Result<(), CompileError> {
    let (min, max) = op.verb.arity();
    let len = op.args.len();
    let within_max = match max {
        Some(m) => len <= m,
        None => true,
    };
    if len < min || !within_max {
        return Err(CompileError::new(
            op.verb,
            step_index,
            CompileErrorKind::ArityViolation,
            format!("{:?} takes between {min} and {max:?} arguments, got {len}", op.verb),
        ));
    }
    Ok(())
}

fn build_command(
    op: &ascript_protocol::Operation,
    step_index: usize,
    sandbox_root: &Path,
    whitelist: &CommandWhitelist,
    allow_plain_http: bool,
) -> Result<CompiledCommand, CompileError> {
    use Verb::*;

    let path_err = |e: ascript_sandbox::SandboxError| {
        CompileError::new(op.verb, step_index, CompileErrorKind::PathViolation, e.to_string())
    };
    let url_err = |e: ascript_sandbox::SandboxError| {
        CompileError::new(op.verb, step_index, CompileErrorKind::UrlViolation, e.to_string())
    };
    let shape_err = |reason: String| CompileError::new(op.verb, step_index, CompileErrorKind::ShapeViolation, reason);

    match op.verb {
        FileRead | FileHash | DirList | DirTree | FileDelete | DirDelete => {
            let mut args = vec![resolve_read_path(&op.args[0], sandbox_root).map_err(path_err)?];
            if op.verb == FileHash {
                let algorithm = op.args.get(1).map(String::as_str).unwrap_or("sha256");
                if !ALLOWED_HASH_ALGORITHMS.contains(&algorithm) {
                    return Err(shape_err(format!("unsupported hash algorithm {algorithm:?}")));
                }
                args.push(algorithm.to_string());
            }
            if op.verb == DirTree {
                let depth = match op.args.get(1) {
                    Some(raw) => raw.parse::<u32>().map_err(|_| shape_err(format!("depth {raw:?} is not a valid integer")))?,
                    None => DIR_TREE_DEFAULT_DEPTH,
                };
                if depth > DIR_TREE_MAX_DEPTH {
                    return Err(shape_err(format!("depth {depth} exceeds the maximum of {DIR_TREE_MAX_DEPTH}")));
                }
                args.push(depth.to_string());
            }
            Ok(in_memory(op.verb, args))
        }
        DirCreate => {
            let path = resolve_write_path(&op.args[0], sandbox_root).map_err(path_err)?;
            Ok(in_memory(op.verb, vec![path]))
        }
        FileWrite | FileAppend => {
            let path = resolve_write_path(&op.args[0], sandbox_root).map_err(path_err)?;
            Ok(in_memory(op.verb, vec![path, op.args[1].clone()]))
        }
        FileCopy | FileMove => {
            let src = resolve_read_path(&op.args[0], sandbox_root).map_err(path_err)?;
            let dst = resolve_write_path(&op.args[1], sandbox_root).map_err(path_err)?;
            Ok(in_memory(op.verb, vec![src, dst]))
        }
        ProcRun => {
            whitelist
                .validate_invocation(&op.args, sandbox_root)
                .map_err(|e| CompileError::new(op.verb, step_index, CompileErrorKind::WhitelistViolation, e.to_string()))?;
            Ok(CompiledCommand { kind: CommandKind::Process, executable: op.args[0].clone(), arguments: op.args[1..].to_vec() })
        }
        HttpGet | HttpPost => {
            let url = ascript_sandbox::validate_url(&op.args[0], allow_plain_http).map_err(url_err)?;
            let mut args = vec![url.to_string()];
            if op.verb == HttpPost {
                if let Some(body) = op.args.get(1) {
                    args.push(body.clone());
                }
            }
            Ok(in_memory(op.verb, args))
        }
        JsonGet | JsonSet | TextReplace => Ok(in_memory(op.verb, op.args.clone())),
        MathEval => {
            let expr = &op.args[0];
            if expr.len() > MAX_MATH_EXPR_LEN || !expr.chars().all(|c| MATH_EXPR_CHARS.contains(c)) {
                return Err(shape_err(format!("MathEval expression is too long or uses disallowed characters: {expr:?}")));
            }
            Ok(in_memory(op.verb, vec![expr.clone()]))
        }
        EnvGet => {
            let name = &op.args[0];
            if !ascript_sandbox::is_env_var_allowed(name) {
                return Err(shape_err(format!("EnvGet may only read an allowlisted environment variable, got {name:?}")));
            }
            Ok(in_memory(op.verb, op.args.clone()))
        }
        SysInfo => Ok(in_memory(op.verb, op.args.clone())),
        FileTemplate => {
            let source = resolve_read_path(&op.args[0], sandbox_root).map_err(path_err)?;
            let dest = resolve_write_path(&op.args[1], sandbox_root).map_err(path_err)?;
            let template = op.template.as_ref().ok_or_else(|| shape_err("FileTemplate requires a template block".to_string()))?;
            if template.values.len() > MAX_TEMPLATE_KEYS {
                return Err(shape_err(format!("FileTemplate declares more than {MAX_TEMPLATE_KEYS} keys")));
            }
            if template.values.values().any(|v| v.contains('$')) {
                return Err(shape_err("FileTemplate values must be literal text, not variable references".to_string()));
            }
            let mut args = vec![source, dest];
            for (key, value) in &template.values {
                args.push(key.clone());
                args.push(value.clone());
            }
            Ok(in_memory(op.verb, args))
        }
        FilePatch => {
            let target = resolve_write_path(&op.args[0], sandbox_root).map_err(path_err)?;
            let patches = op.patches.as_ref().ok_or_else(|| shape_err("FilePatch requires at least one patch".to_string()))?;
            if patches.is_empty() || patches.len() > MAX_PATCHES {
                return Err(shape_err(format!("FilePatch must declare between 1 and {MAX_PATCHES} patches")));
            }
            for patch in patches {
                if patch.find.is_empty() || patch.find.contains('$') || patch.replace.contains('$') {
                    return Err(shape_err("FilePatch find/replace must be non-empty literal text".to_string()));
                }
            }
            let mut args = vec![target];
            for patch in patches {
                args.push(patch.find.clone());
                args.push(patch.replace.clone());
            }
            Ok(in_memory(op.verb, args))
        }
        ForEach | If | Include | FileWriteMany | FileCopyMany | FileDeleteMany => {
            unreachable!("structural verbs are eliminated by the expander before compilation")
        }
    }
}

fn resolve_read_path(user_path: &str, sandbox_root: &Path) -> Result<String, ascript_sandbox::SandboxError> {
    ascript_sandbox::resolve(user_path, sandbox_root).map(|p| p.to_string_lossy().into_owned())
}

fn resolve_write_path(user_path: &str, sandbox_root: &Path) -> Result<String, ascript_sandbox::SandboxError> {
    ascript_sandbox::resolve_for_write(user_path, sandbox_root).map(|p| p.to_string_lossy().into_owned())
}

fn in_memory(verb: Verb, arguments: Vec<String>) -> CompiledCommand {
    CompiledCommand { kind: CommandKind::InMemory, executable: verb_marker(verb).to_string(), arguments }
}

fn verb_marker(verb: Verb) -> &'static str {
    use Verb::*;
    match verb {
        FileRead => "file_read",
        FileHash => "file_hash",
        DirList => "dir_list",
        DirTree => "dir_tree",
        FileWrite => "file_write",
        FileAppend => "file_append",
        FileCopy => "file_copy",
        FileMove => "file_move",
        FileDelete => "file_delete",
        DirCreate => "dir_create",
        DirDelete => "dir_delete",
        ProcRun => "proc_run",
        HttpGet => "http_get",
        HttpPost => "http_post",
        JsonGet => "json_get",
        JsonSet => "json_set",
        TextReplace => "text_replace",
        MathEval => "math_eval",
        EnvGet => "env_get",
        SysInfo => "sys_info",
        FileTemplate => "file_template",
        FilePatch => "file_patch",
        ForEach => "for_each",
        If => "if",
        FileWriteMany => "file_write_many",
        FileCopyMany => "file_copy_many",
        FileDeleteMany => "file_delete_many",
        Include => "include",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ascript_protocol::Operation;

    fn whitelist() -> CommandWhitelist {
        CommandWhitelist::build(ascript_sandbox::RuntimeConfig { project_bases: vec!["demo".to_string()], git_remote_urls: vec![] })
    }

    fn workspace() -> WorkspaceContext {
        WorkspaceContext::new("/sbx", "/sbx")
    }

    fn script(ops: Vec<Operation>) -> Script {
        Script { operations: ops, cleanup: vec![], options: None, fragments: Default::default() }
    }

    #[test]
    fn compiles_file_write_with_sandboxed_destination() {
        let compiled = compile_script(&script(vec![Operation::simple(Verb::FileWrite, ["notes.txt", "hello"])]), workspace(), &whitelist(), false)
            .expect("compiles");
        assert_eq!(compiled.steps.len(), 1);
        assert_eq!(compiled.steps[0].command.arguments[0], "/sbx/notes.txt");
    }

    #[test]
    fn rejects_path_traversal_at_compile_time() {
        let err = compile_script(&script(vec![Operation::simple(Verb::FileRead, ["../../etc/passwd"])]), workspace(), &whitelist(), false)
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::PathViolation);
    }

    #[test]
    fn proc_run_with_prev_reference_fails_before_whitelist_check() {
        let err = compile_script(
            &script(vec![Operation::simple(Verb::ProcRun, ["git", "commit", "-m", "$PREV"])]),
            workspace(),
            &whitelist(),
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::VariableViolation);
    }

    #[test]
    fn proc_run_without_a_matching_template_is_rejected() {
        let err = compile_script(&script(vec![Operation::simple(Verb::ProcRun, ["git", "push", "origin", "main"])]), workspace(), &whitelist(), false)
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::WhitelistViolation);
    }

    #[test]
    fn math_eval_rejects_disallowed_characters() {
        let err = compile_script(&script(vec![Operation::simple(Verb::MathEval, ["system(1)"])]), workspace(), &whitelist(), false).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ShapeViolation);
    }

    #[test]
    fn dir_tree_rejects_depth_beyond_maximum() {
        let err = compile_script(&script(vec![Operation::simple(Verb::DirTree, [".", "9"])]), workspace(), &whitelist(), false).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ShapeViolation);
    }

    #[test]
    fn file_hash_defaults_to_sha256() {
        let compiled = compile_script(&script(vec![Operation::simple(Verb::FileHash, ["a.txt"])]), workspace(), &whitelist(), false).expect("compiles");
        assert_eq!(compiled.steps[0].command.arguments[1], "sha256");
    }

    #[test]
    fn env_get_rejects_name_outside_the_allowlist() {
        let err = compile_script(&script(vec![Operation::simple(Verb::EnvGet, ["AWS_SECRET_ACCESS_KEY"])]), workspace(), &whitelist(), false)
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::ShapeViolation);
    }

    #[test]
    fn env_get_accepts_allowlisted_name() {
        let compiled = compile_script(&script(vec![Operation::simple(Verb::EnvGet, ["HOME"])]), workspace(), &whitelist(), false).expect("compiles");
        assert_eq!(compiled.steps[0].command.arguments[0], "HOME");
    }

    #[test]
    fn math_eval_accepts_modulo() {
        let compiled = compile_script(&script(vec![Operation::simple(Verb::MathEval, ["7 % 2"])]), workspace(), &whitelist(), false).expect("compiles");
        assert_eq!(compiled.steps[0].command.arguments[0], "7 % 2");
    }

    #[test]
    fn proc_run_accepts_non_tainted_capture_reference() {
        let compiled = compile_script(
            &script(vec![
                Operation { capture_as: Some("X".to_string()), ..Operation::simple(Verb::FileRead, ["a.txt"]) },
                Operation::simple(Verb::ProcRun, ["dotnet", "build", "$X"]),
            ]),
            workspace(),
            &whitelist(),
            false,
        )
        .expect("compiles");
        assert_eq!(compiled.steps[1].command.arguments[2], "$X");
    }
}
