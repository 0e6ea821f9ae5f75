use class_weaver::classfile::ClassFile;
use class_weaver::classfile::access::{ACC_PRIVATE, ACC_PUBLIC, ACC_SUPER};
use class_weaver::emit::{ClassBuilder, FieldSpec, MethodBuilder, Opcode};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const MODEL: &str = r#"{
  "classes": [
    {
      "name": "com.acme.Employee",
      "weave_internal": true,
      "weave_change_tracking": true,
      "weave_fetch_groups": true,
      "attributes": [{"name": "salary", "type": "int"}]
    }
  ]
}"#;

fn temp_dir(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "class_weaver_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

fn read_jar_entry(path: &Path, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path)?)?;
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// `com/acme/Employee` with an int `salary` field and its getter.
fn employee_class() -> anyhow::Result<Vec<u8>> {
    let name = "com/acme/Employee";
    let class = ClassFile::new(name, Some("java/lang/Object"), ACC_PUBLIC | ACC_SUPER, 52)?;
    let mut builder = ClassBuilder::new(class)?;

    let mut ctor = MethodBuilder::new(ACC_PUBLIC, "<init>", "()V");
    ctor.aload(0)
        .invoke_special("java/lang/Object", "<init>", "()V")
        .op(Opcode::Return);
    builder.add_method(ctor)?;

    builder.add_field(FieldSpec::new(ACC_PRIVATE, "salary", "I"))?;
    let mut get = MethodBuilder::new(ACC_PUBLIC, "getSalary", "()I");
    get.aload(0).get_field(name, "salary", "I").op(Opcode::Ireturn);
    builder.add_method(get)?;

    Ok(builder.finish().0.to_bytes())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

fn run(bin: &str, args: &[&str], envs: &[(&str, &str)]) -> anyhow::Result<std::process::Output> {
    let mut cmd = Command::new(bin);
    cmd.args(args);
    for (k, v) in envs {
        cmd.env(k, v);
    }
    Ok(cmd.output()?)
}

fn run_json(bin: &str, args: &[&str], envs: &[(&str, &str)]) -> anyhow::Result<Value> {
    let out = run(bin, args, envs)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

fn interfaces(class: &[u8]) -> anyhow::Result<Vec<String>> {
    Ok(ClassFile::parse(class)?.interface_names()?)
}

#[test]
fn weave_jar_in_place_then_skip_then_force() -> anyhow::Result<()> {
    let base = temp_dir("weave_flow");
    let db = base.join("ledger.lmdb");
    let model = base.join("model.json");
    let jar = base.join("app.jar");
    write_file(&model, MODEL)?;
    let original = employee_class()?;
    write_jar(
        &jar,
        &[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ("com/acme/Employee.class", original.clone()),
        ],
    )?;

    let bin = env!("CARGO_BIN_EXE_class-weaver");
    let envs = [("CLASS_WEAVER_JAVA_VERSION", "17")];
    let db_arg = db.to_string_lossy().to_string();
    let model_arg = model.to_string_lossy().to_string();
    let jar_arg = jar.to_string_lossy().to_string();
    let args = ["--db", db_arg.as_str(), "weave", "-m", model_arg.as_str(), jar_arg.as_str()];

    let first = run_json(bin, &args, &envs)?;
    assert_eq!(first["target_java"], Value::String("17".to_string()));
    assert_eq!(first["inputs"][0]["skipped"], Value::Bool(false));
    assert_eq!(first["inputs"][0]["classes"], Value::from(1));
    assert_eq!(first["inputs"][0]["woven"], Value::from(1));
    assert!(first["inputs"][0].get("reports").is_none());

    let woven = read_jar_entry(&jar, "com/acme/Employee.class")?;
    assert_ne!(woven, original);
    let added = interfaces(&woven)?;
    assert!(added.iter().any(|i| i == "org/eclipse/persistence/internal/weaving/PersistenceWeaved"));
    assert!(added.iter().any(|i| i == "org/eclipse/persistence/descriptors/changetracking/ChangeTracker"));
    assert_eq!(
        read_jar_entry(&jar, "META-INF/MANIFEST.MF")?,
        b"Manifest-Version: 1.0\n".to_vec()
    );

    let second = run_json(bin, &args, &envs)?;
    assert_eq!(second["inputs"][0]["skipped"], Value::Bool(true));

    // Another target or classpath invalidates the ledger row.
    let retarget = run_json(bin, &args, &[("CLASS_WEAVER_JAVA_VERSION", "11")])?;
    assert_eq!(retarget["inputs"][0]["skipped"], Value::Bool(false));
    assert_eq!(retarget["inputs"][0]["already_woven"], Value::from(1));

    let jaxb = base.join("lib/jaxb-api.jar");
    write_jar(
        &jaxb,
        &[("javax/xml/bind/annotation/XmlTransient.class", b"x".to_vec())],
    )?;
    let jaxb_arg = jaxb.to_string_lossy().to_string();
    let mut classpath_args = args.to_vec();
    classpath_args.extend(["--classpath", jaxb_arg.as_str()]);
    let with_jaxb = run_json(bin, &classpath_args, &envs)?;
    assert_eq!(with_jaxb["xml_transient"], Value::Bool(true));
    assert_eq!(with_jaxb["inputs"][0]["skipped"], Value::Bool(false));

    let mut forced_args = args.to_vec();
    forced_args.push("--force");
    forced_args.push("--report");
    let forced = run_json(bin, &forced_args, &envs)?;
    assert_eq!(forced["inputs"][0]["woven"], Value::from(0));
    assert_eq!(forced["inputs"][0]["already_woven"], Value::from(1));
    assert_eq!(read_jar_entry(&jar, "com/acme/Employee.class")?, woven);

    let stats = run_json(bin, &["--db", db_arg.as_str(), "stats"], &envs)?;
    assert_eq!(stats["inputs"], Value::from(1));
    assert_eq!(stats["woven_classes"], Value::from(0));

    let cleared = run(bin, &["--db", db_arg.as_str(), "clear"], &envs)?;
    assert!(cleared.status.success());
    assert!(!db.exists());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn weave_reports_rewritten_accesses_into_separate_output() -> anyhow::Result<()> {
    let base = temp_dir("weave_output");
    let model = base.join("model.json");
    let jar = base.join("app.jar");
    let out = base.join("out/app-woven.jar");
    write_file(&model, MODEL)?;
    let original = employee_class()?;
    write_jar(&jar, &[("com/acme/Employee.class", original.clone())])?;

    let bin = env!("CARGO_BIN_EXE_class-weaver");
    let run = run_json(
        bin,
        &[
            "--db",
            base.join("ledger.lmdb").to_string_lossy().as_ref(),
            "weave",
            "--model",
            model.to_string_lossy().as_ref(),
            "--output",
            out.to_string_lossy().as_ref(),
            "--java-version",
            "1.8",
            "--report",
            jar.to_string_lossy().as_ref(),
        ],
        &[],
    )?;
    assert_eq!(run["target_java"], Value::String("1.8".to_string()));
    let report = &run["inputs"][0]["reports"][0];
    assert_eq!(report["class"], Value::String("com/acme/Employee".to_string()));
    assert_eq!(report["rewritten_accesses"][0]["method"], Value::String("getSalary()I".to_string()));
    assert_eq!(report["stack_maps"], Value::Bool(true));

    assert_eq!(read_jar_entry(&jar, "com/acme/Employee.class")?, original);
    assert_ne!(read_jar_entry(&out, "com/acme/Employee.class")?, original);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn invalid_model_fails_without_touching_input() -> anyhow::Result<()> {
    let base = temp_dir("bad_model");
    let model = base.join("model.json");
    let jar = base.join("app.jar");
    write_file(
        &model,
        r#"{"classes": [{"name": "com.acme.Manager", "superclass": "com.acme.Employee"}]}"#,
    )?;
    let original = employee_class()?;
    write_jar(&jar, &[("com/acme/Employee.class", original.clone())])?;

    let bin = env!("CARGO_BIN_EXE_class-weaver");
    let out = run(
        bin,
        &[
            "--db",
            base.join("ledger.lmdb").to_string_lossy().as_ref(),
            "weave",
            "-m",
            model.to_string_lossy().as_ref(),
            jar.to_string_lossy().as_ref(),
        ],
        &[("CLASS_WEAVER_JAVA_VERSION", "17")],
    )?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("com/acme/Employee"));
    assert_eq!(read_jar_entry(&jar, "com/acme/Employee.class")?, original);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn inspect_shows_structure_and_planned_members() -> anyhow::Result<()> {
    let base = temp_dir("inspect");
    let model = base.join("model.json");
    let class = base.join("Employee.class");
    write_file(&model, MODEL)?;
    std::fs::write(&class, employee_class()?)?;

    let bin = env!("CARGO_BIN_EXE_class-weaver");
    let plain = run_json(bin, &["inspect", class.to_string_lossy().as_ref()], &[])?;
    assert_eq!(plain["class"]["name"], Value::String("com/acme/Employee".to_string()));
    assert_eq!(plain["class"]["major_version"], Value::from(52));
    assert!(plain.get("weave").is_none());

    let planned = run_json(
        bin,
        &[
            "inspect",
            class.to_string_lossy().as_ref(),
            "-m",
            model.to_string_lossy().as_ref(),
        ],
        &[],
    )?;
    assert_eq!(planned["already_woven"], Value::Bool(false));
    let methods = planned["weave"]["methods"].as_array().cloned().unwrap_or_default();
    assert!(methods.contains(&Value::String("_persistence_set_salary(I)V".to_string())));
    assert!(methods.contains(&Value::String(
        "_persistence_get(Ljava/lang/String;)Ljava/lang/Object;".to_string()
    )));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[cfg(unix)]
#[test]
fn java_runtime_is_detected_through_configured_binary() -> anyhow::Result<()> {
    let base = temp_dir("java_detect");
    let model = base.join("model.json");
    let jar = base.join("app.jar");
    write_file(&model, MODEL)?;
    write_jar(&jar, &[("com/acme/Employee.class", employee_class()?)])?;

    let fake_java = base.join("bin/java");
    write_file(
        &fake_java,
        "#!/bin/sh\n\
         echo 'Property settings:' >&2\n\
         echo '    java.specification.vendor = Oracle Corporation' >&2\n\
         echo '    java.specification.version = 11' >&2\n\
         echo '    java.version = 11.0.21' >&2\n\
         echo 'openjdk version \"11.0.21\" 2023-10-17' >&2\n",
    )?;
    make_executable(&fake_java)?;

    let bin = env!("CARGO_BIN_EXE_class-weaver");
    let owned = vec![
        "--db".to_string(),
        base.join("ledger.lmdb").to_string_lossy().to_string(),
        "weave".to_string(),
        "-m".to_string(),
        model.to_string_lossy().to_string(),
        jar.to_string_lossy().to_string(),
    ];
    let mut args: Vec<&str> = owned.iter().map(String::as_str).collect();

    let java = fake_java.to_string_lossy().to_string();
    let detected = run_json(bin, &args, &[("CLASS_WEAVER_JAVA", java.as_str())])?;
    assert_eq!(detected["target_java"], Value::String("11".to_string()));

    let missing = base.join("bin/missing-java").to_string_lossy().to_string();
    args.push("--force");
    let fallback = run_json(bin, &args, &[("CLASS_WEAVER_JAVA", missing.as_str())])?;
    assert_eq!(fallback["target_java"], Value::String("1.1".to_string()));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
