#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use iac_validator::config::Settings;
use iac_validator::tools::Toolchain;

pub const MISSING_BIN: &str = "/nonexistent/iac-validator-test/bin";

/// 不依赖任何外部工具的设置；临时工作区放在 `temp_root`
pub fn offline_settings(temp_root: &Path) -> Settings {
    Settings {
        terraform_bin: MISSING_BIN.to_string(),
        az_bin: MISSING_BIN.to_string(),
        temp_root: temp_root.to_path_buf(),
        tool_timeout: Duration::from_secs(10),
        ..Settings::default()
    }
}

pub fn toolchain(settings: Settings) -> Arc<Toolchain> {
    Arc::new(Toolchain::new(Arc::new(settings)))
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[cfg(unix)]
pub mod fake {
    use super::*;
    use once_cell::sync::Lazy;
    use std::os::unix::fs::PermissionsExt;

    /// 假 terraform：init 创建 `.terraform`，validate 输出 `-json` 文档。
    /// main.tf 引用了未声明的 `var.xxx` 时报告错误。
    const TERRAFORM: &str = r#"#!/bin/sh
case "$1" in
  init)
    mkdir -p .terraform
    echo "Terraform has been successfully initialized!"
    exit 0
    ;;
  fmt)
    exit 0
    ;;
  validate)
    name=""
    if [ -f main.tf ] && ! grep -q '^variable' main.tf; then
      name=$(sed -n 's/.*var\.\([A-Za-z_][A-Za-z0-9_]*\).*/\1/p' main.tf | head -n 1)
    fi
    if [ -n "$name" ]; then
      cat <<JSON
{"format_version":"1.0","valid":false,"error_count":1,"warning_count":0,"diagnostics":[{"severity":"error","summary":"Reference to undeclared input variable","detail":"An input variable with the name \"$name\" has not been declared.","range":{"filename":"main.tf","start":{"line":2,"column":14,"byte":30},"end":{"line":2,"column":24,"byte":40}}}]}
JSON
      exit 1
    fi
    echo '{"format_version":"1.0","valid":true,"error_count":0,"warning_count":0,"diagnostics":[]}'
    exit 0
    ;;
esac
echo "unexpected command: $1" >&2
exit 2
"#;

    /// init 失败、fmt 报告格式漂移，但 validate 通过的 terraform
    const DRIFTING: &str = r#"#!/bin/sh
case "$1" in
  init)
    echo "Error: Failed to query available provider packages" >&2
    exit 1
    ;;
  fmt)
    echo "$4"
    exit 3
    ;;
  validate)
    echo '{"format_version":"1.0","valid":true,"error_count":0,"warning_count":0,"diagnostics":[]}'
    exit 0
    ;;
esac
exit 2
"#;

    /// 永不退出的 terraform
    const HANGING: &str = "#!/bin/sh\nexec sleep 30\n";

    /// 假 az：`az bicep build --file <path> --stdout`
    const AZ: &str = r#"#!/bin/sh
file="$4"
if grep -q "resource" "$file" && ! grep -q "=" "$file"; then
  echo "ERROR: $file(2,7) : Error BCP018: Expected the \"=\" character at this location. [https://aka.ms/bicep/core-diagnostics#BCP018]" >&2
  exit 1
fi
echo '{"$schema":"https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#","resources":[]}'
exit 0
"#;

    pub struct FakeTools {
        _dir: tempfile::TempDir,
        pub terraform: PathBuf,
        pub hanging: PathBuf,
        pub drifting: PathBuf,
        pub az: PathBuf,
    }

    // 所有脚本在任何测试启动子进程之前一次写完
    static TOOLS: Lazy<FakeTools> = Lazy::new(|| {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };
        let terraform = write("terraform", TERRAFORM);
        let hanging = write("terraform-hang", HANGING);
        let drifting = write("terraform-drift", DRIFTING);
        let az = write("az", AZ);
        FakeTools {
            _dir: dir,
            terraform,
            hanging,
            drifting,
            az,
        }
    });

    pub fn tools() -> &'static FakeTools {
        &TOOLS
    }

    pub fn settings(temp_root: &Path) -> Settings {
        let tools = tools();
        Settings {
            terraform_bin: tools.terraform.to_string_lossy().into_owned(),
            az_bin: tools.az.to_string_lossy().into_owned(),
            ..offline_settings(temp_root)
        }
    }
}
