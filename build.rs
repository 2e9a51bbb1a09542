use anyhow::Result;
use vergen::EmitBuilder;

fn main() -> Result<()> {
    // optionally emit git branch and hash
    // builds from a tarball have neither, so failures are ignored
    let _ = EmitBuilder::builder()
        .git_branch()
        .git_sha(true)
        .fail_on_error()
        .quiet()
        .emit();
    Ok(())
}
