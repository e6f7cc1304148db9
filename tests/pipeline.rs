//! End-to-end tests for both pipelines.

mod common;

use std::fs;

use common::*;
use jarcloak::checksum::{Checksum, Crc32};
use jarcloak::classfile::{ClassFile, CodeAttribute};
use jarcloak::patch::{DEFAULT_HELPER_CLASS, HOOK_DESCRIPTOR, HOOK_NAME};
use jarcloak::protect::output_path_for;
use jarcloak::trace::{IgnoreReason, NoTrace, TraceEvent, TraceLog, TreeTrace};
use jarcloak::{Action, ArchivePolicy, EntryPath, Error, PatchStrength, PipelineMode, Protector};

const BOTH: [PipelineMode; 2] = [PipelineMode::TwoPass, PipelineMode::Streaming];
const BOOT_LAUNCHER: &str = "org.springframework.boot.loader.JarLauncher";
const HELPER_ENTRY: &str = "com/github/jsbxyyx/mjar/NativeDecryptHelper.class";

fn protect(policy: &ArchivePolicy, input: &[u8], mode: PipelineMode) -> Vec<u8> {
    Protector::new(policy, &reverse)
        .protect_bytes(input, mode, &mut NoTrace)
        .unwrap()
        .0
}

fn constructor_code(class: &[u8], descriptor: &str) -> Vec<u8> {
    let class = ClassFile::parse(class).unwrap();
    let pool = &class.constant_pool;
    let method = class
        .methods
        .iter()
        .find(|m| m.name(pool).unwrap() == "<init>" && m.descriptor(pool).unwrap() == descriptor)
        .unwrap();
    let index = method.code_attribute(pool).unwrap().unwrap();
    CodeAttribute::parse(&method.attributes[index].info)
        .unwrap()
        .code
}

#[test]
fn test_manifest_leads_every_output() {
    let main = plain_class("com/acme/Main");
    let input = jar(&[
        ("com/acme/Main.class", &main),
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
    ]);
    let policy = ArchivePolicy::new("com.acme");

    for mode in BOTH {
        let output = protect(&policy, &input, mode);
        let names = names(&output);
        assert_eq!(&names[..2], ["META-INF/", "META-INF/MANIFEST.MF"], "{mode}");
        assert_eq!(
            entry_data(&output, "META-INF/MANIFEST.MF"),
            manifest("com.acme.Main")
        );
        assert_eq!(names.iter().filter(|n| *n == "META-INF/MANIFEST.MF").count(), 1);
    }

    // Streaming lifts the manifest out of the single read of each level,
    // keeping its recorded time.
    let output = protect(&policy, &input, PipelineMode::Streaming);
    assert_eq!(entries(&output)[1].modified, fixed_time());
}

#[test]
fn test_target_classes_encoded_others_untouched() {
    let main = plain_class("com/acme/Main");
    let other = plain_class("org/other/Util");
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("com/acme/Main.class", &main),
        ("org/other/Util.class", &other),
        ("application.yml", b"server.port: 8080"),
    ]);
    let policy = ArchivePolicy::new("com.acme");

    for mode in BOTH {
        let (output, stats) = Protector::new(&policy, &reverse)
            .protect_bytes(&input, mode, &mut NoTrace)
            .unwrap();
        assert_eq!(entry_data(&output, "com/acme/Main.class"), reversed(&main));
        assert_eq!(entry_data(&output, "org/other/Util.class"), other);
        assert_eq!(entry_data(&output, "application.yml"), b"server.port: 8080");
        assert_eq!(stats.encoded, 1, "{mode}");
        assert_eq!(stats.classes, 2);
        assert_eq!(stats.bytes_out, output.len() as u64);
    }
}

#[test]
fn test_ignored_class_is_not_encoded() {
    let boot = plain_class("com/acme/Bootstrap");
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Bootstrap")),
        ("com/acme/Bootstrap.class", &boot),
    ]);
    let policy = ArchivePolicy::new("com.acme").ignore_class("com/acme/Bootstrap.class");
    for mode in BOTH {
        let output = protect(&policy, &input, mode);
        assert_eq!(entry_data(&output, "com/acme/Bootstrap.class"), boot);
    }
}

#[test]
fn test_two_pass_merges_service_files_across_archives() {
    let dep = jar(&[
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n\r\n"),
        ("META-INF/services/com.acme.Plugin", b"B"),
        ("com/dep/Dep.class", &plain_class("com/dep/Dep")),
    ]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("META-INF/services/com.acme.Plugin", b"A"),
        ("lib/dep.jar", &dep),
    ]);
    let policy = ArchivePolicy::new("com.acme");
    let mut log = TraceLog::new();
    let (output, stats) = Protector::new(&policy, &reverse)
        .protect_bytes(&input, PipelineMode::TwoPass, &mut log)
        .unwrap();

    assert_eq!(entry_data(&output, "META-INF/services/com.acme.Plugin"), b"A\nB");
    let names = names(&output);
    assert!(names.contains(&"com/dep/Dep.class".to_string()));
    assert!(names.contains(&"com/dep/".to_string()));
    assert!(!names.iter().any(|n| n.ends_with(".jar")));
    assert_eq!(stats.merged, 1);
    assert_eq!(stats.archives, 1);
    assert!(log.events().contains(&TraceEvent::Archive {
        path: "lib/dep.jar".into(),
        depth: 0,
    }));
}

#[test]
fn test_container_libraries_concatenate_service_files() {
    let service = plain_class("com/acme/app/Service");
    let first = jar(&[("META-INF/services/foo", b"A")]);
    let second = jar(&[("META-INF/services/foo", b"B")]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest(BOOT_LAUNCHER)),
        ("com/acme/app/Service.class", &service),
        ("BOOT-INF/lib/x.jar", &first),
        ("BOOT-INF/lib/y.jar", &second),
    ]);
    let policy = ArchivePolicy::new("com.acme.app");
    let (output, stats) = Protector::new(&policy, &reverse)
        .protect_bytes(&input, PipelineMode::TwoPass, &mut NoTrace)
        .unwrap();

    assert_eq!(entry_data(&output, "META-INF/services/foo"), b"A\nB");
    assert_eq!(entry_data(&output, "com/acme/app/Service.class"), reversed(&service));
    assert!(!names(&output).iter().any(|n| n.starts_with("BOOT-INF")));
    assert_eq!(stats.archives, 2);
    assert_eq!(stats.merged, 1);
}

#[test]
fn test_two_pass_merges_spring_factories() {
    let dep = jar(&[(
        "META-INF/spring.factories",
        b"org.springframework.boot.autoconfigure.EnableAutoConfiguration=com.dep.Config\n",
    )]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        (
            "META-INF/spring.factories",
            b"org.springframework.boot.autoconfigure.EnableAutoConfiguration=com.acme.Config\n",
        ),
        ("lib/dep.jar", &dep),
    ]);
    let output = protect(&ArchivePolicy::new("com.acme"), &input, PipelineMode::TwoPass);
    let merged = String::from_utf8(entry_data(&output, "META-INF/spring.factories")).unwrap();
    assert!(merged.starts_with("#Merged by jarcloak"));
    assert!(merged.contains(
        "org.springframework.boot.autoconfigure.EnableAutoConfiguration=com.acme.Config,com.dep.Config"
    ));
}

#[test]
fn test_two_pass_flattens_container_archive() {
    let app = plain_class("com/acme/App");
    let dep = jar(&[("com/dep/Dep.class", &plain_class("com/dep/Dep"))]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest(BOOT_LAUNCHER)),
        ("BOOT-INF/classes/", b""),
        ("BOOT-INF/classes/com/acme/App.class", &app),
        ("BOOT-INF/lib/dep.jar", &dep),
    ]);
    let output = protect(&ArchivePolicy::new("com.acme"), &input, PipelineMode::TwoPass);

    assert_eq!(entry_data(&output, "com/acme/App.class"), reversed(&app));
    let names = names(&output);
    assert!(names.contains(&"com/dep/Dep.class".to_string()));
    assert!(
        !names
            .iter()
            .any(|n| n.starts_with("BOOT-INF/classes") || n.starts_with("BOOT-INF/lib"))
    );
}

#[test]
fn test_two_pass_requires_main_class() {
    let input = jar(&[("com/acme/A.class", &plain_class("com/acme/A"))]);
    let policy = ArchivePolicy::new("com.acme");
    let err = Protector::new(&policy, &reverse)
        .protect_bytes(&input, PipelineMode::TwoPass, &mut NoTrace)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::MissingManifestAttribute {
            attribute: "Main-Class"
        }
    ));

    // Streaming has no such requirement.
    let output = protect(&policy, &input, PipelineMode::Streaming);
    assert_eq!(names(&output), ["com/", "com/acme/", "com/acme/A.class"]);
}

#[test]
fn test_two_pass_preserves_timestamps() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("static/", b""),
        ("static/index.html", b"<html/>"),
    ]);
    let output = protect(&ArchivePolicy::new("com.acme"), &input, PipelineMode::TwoPass);
    for entry in entries(&output) {
        if entry.path.as_str().starts_with("static") {
            assert_eq!(entry.modified, fixed_time(), "{}", entry.path);
        }
    }
}

#[test]
fn test_streaming_keeps_nested_archives_nested() {
    let lib = plain_class("com/acme/Lib");
    let dep = jar(&[
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n\r\n"),
        ("com/acme/Lib.class", &lib),
    ]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest(BOOT_LAUNCHER)),
        ("BOOT-INF/lib/dep.jar", &dep),
        ("plugins/extra.jar", &dep),
    ]);
    let mut log = TraceLog::new();
    let (output, stats) = Protector::new(&ArchivePolicy::new("com.acme"), &reverse)
        .protect_bytes(&input, PipelineMode::Streaming, &mut log)
        .unwrap();

    assert_eq!(
        names(&output),
        [
            "META-INF/",
            "META-INF/MANIFEST.MF",
            "BOOT-INF/",
            "BOOT-INF/lib/",
            "BOOT-INF/lib/dep.jar",
            "plugins/",
            "plugins/extra.jar"
        ]
    );
    for name in ["BOOT-INF/lib/dep.jar", "plugins/extra.jar"] {
        let nested = entry_data(&output, name);
        assert_eq!(
            &names(&nested)[1..],
            [
                "META-INF/MANIFEST.MF",
                "com/",
                "com/acme/",
                "com/acme/Lib.class"
            ]
        );
        assert_eq!(entry_data(&nested, "com/acme/Lib.class"), reversed(&lib));
    }
    assert_eq!(stats.archives, 2);
    assert_eq!(stats.encoded, 2);
    assert!(log.events().contains(&TraceEvent::Class {
        path: "com/acme/Lib.class".into(),
        depth: 1,
        action: Action::Encrypt,
        injected: false,
    }));
}

#[test]
fn test_streaming_stores_library_archives_with_crc() {
    let dep = jar(&[("com/acme/Lib.class", &plain_class("com/acme/Lib"))]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest(BOOT_LAUNCHER)),
        ("BOOT-INF/lib/dep.jar", &dep),
        ("plugins/extra.jar", &dep),
    ]);
    let output = protect(&ArchivePolicy::new("com.acme"), &input, PipelineMode::Streaming);

    for entry in entries(&output) {
        let header = &output[entry.offset as usize..];
        let flags = u16::from_le_bytes([header[6], header[7]]);
        let method = u16::from_le_bytes([header[8], header[9]]);
        let crc = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        let compressed = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);
        let size = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
        match entry.path.as_str() {
            "BOOT-INF/lib/dep.jar" => {
                assert_eq!(method, 0);
                assert_eq!(flags & 0x0008, 0, "no data descriptor");
                assert_eq!(crc, Crc32::compute(&entry.data));
                assert_eq!(compressed as usize, entry.data.len());
                assert_eq!(size as usize, entry.data.len());
                // The nested archive is readable straight from its recorded span.
                let start = 30
                    + usize::from(u16::from_le_bytes([header[26], header[27]]))
                    + usize::from(u16::from_le_bytes([header[28], header[29]]));
                let span = &header[start..start + compressed as usize];
                assert_eq!(names(span), names(&entry.data));
            }
            "plugins/extra.jar" => assert_eq!(method, 8),
            _ => {}
        }
    }
}

#[test]
fn test_directories_precede_their_children() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("a/b/c.txt", b"c"),
        ("a/", b""),
    ]);
    let policy = ArchivePolicy::new("com.acme");

    for mode in BOTH {
        let names = names(&protect(&policy, &input, mode));
        for (index, name) in names.iter().enumerate() {
            for dir in EntryPath::new(name).unwrap().parent_dirs() {
                let position = names.iter().position(|n| n == dir.as_str());
                assert!(
                    matches!(position, Some(p) if p < index),
                    "{mode}: {dir} must precede {name} in {names:?}"
                );
            }
        }
        assert_eq!(
            names,
            ["META-INF/", "META-INF/MANIFEST.MF", "a/", "a/b/", "a/b/c.txt"],
            "{mode}"
        );
    }
}

#[test]
fn test_untouched_library_leaves_survive_both_modes() {
    let util = plain_class("org/dep/Util");
    let dep_manifest = b"Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\n";
    let dep = jar(&[
        ("META-INF/MANIFEST.MF", dep_manifest),
        ("org/dep/", b""),
        ("org/dep/Util.class", &util),
        ("org/dep/messages.properties", b"greeting=hello\n"),
        ("org/dep/logo.png", &[0x89, b'P', b'N', b'G', 0, 0xff]),
    ]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest(BOOT_LAUNCHER)),
        ("BOOT-INF/lib/dep.jar", &dep),
    ]);
    let leaves = |archive: &[u8]| -> Vec<(String, Vec<u8>)> {
        entries(archive)
            .into_iter()
            .filter(|e| !e.is_directory() && !e.path.is_manifest())
            .map(|e| (e.path.to_string(), e.data))
            .collect()
    };
    let expected = leaves(&dep);
    assert_eq!(expected.len(), 3);
    let policy = ArchivePolicy::new("com.acme");

    let streamed = protect(&policy, &input, PipelineMode::Streaming);
    let nested = entry_data(&streamed, "BOOT-INF/lib/dep.jar");
    assert_eq!(leaves(&nested), expected);
    assert_eq!(entry_data(&nested, "META-INF/MANIFEST.MF"), dep_manifest);

    let flat = protect(&policy, &input, PipelineMode::TwoPass);
    for (name, data) in &expected {
        assert_eq!(&entry_data(&flat, name), data, "{name}");
    }
}

#[test]
fn test_signature_files_dropped() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("META-INF/APP.SF", b"sig"),
        ("META-INF/APP.RSA", b"cert"),
        ("META-INF/app.ec", b"cert"),
        ("com/acme/Main.class", &plain_class("com/acme/Main")),
    ]);
    for mode in BOTH {
        let mut log = TraceLog::new();
        let (output, stats) = Protector::new(&ArchivePolicy::new("com.acme"), &reverse)
            .protect_bytes(&input, mode, &mut log)
            .unwrap();
        assert!(
            !names(&output).iter().any(|n| n.starts_with("META-INF/APP")),
            "{mode}"
        );
        let dropped = log
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    TraceEvent::Ignored {
                        reason: IgnoreReason::Signature,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(dropped, 3);
        assert!(stats.ignored >= 3);
    }
}

#[test]
fn test_strong_patch_injects_hook_without_helper() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("org/springframework/asm/ClassReader.class", &shim_class(SPRING_READER)),
    ]);
    let policy = ArchivePolicy::new("com.acme").strength(PatchStrength::Strong);
    for mode in BOTH {
        let (output, stats) = Protector::new(&policy, &reverse)
            .protect_bytes(&input, mode, &mut NoTrace)
            .unwrap();
        let patched = entry_data(&output, "org/springframework/asm/ClassReader.class");
        let class = ClassFile::parse(&patched).unwrap();
        assert!(class.declares_method(HOOK_NAME, HOOK_DESCRIPTOR).unwrap());
        for descriptor in ["([BIZ)V", "([BI)V"] {
            assert_eq!(&constructor_code(&patched, descriptor)[..3], [0x2b, 0x1c, 0xb8]);
        }
        assert!(!names(&output).contains(&HELPER_ENTRY.to_string()));
        assert_eq!(stats.patched, 1, "{mode}");
        assert_eq!(stats.hooks_injected, 1);
        assert_eq!(stats.helpers_added, 0);
    }
}

#[test]
fn test_weak_patch_adds_helper_class() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("org/objectweb/asm/ClassReader.class", &shim_class(ASM_READER)),
    ]);
    let helper = plain_class(DEFAULT_HELPER_CLASS);
    let policy = ArchivePolicy::new("com.acme")
        .strength(PatchStrength::Weak)
        .helper_bytes(helper.clone());

    for mode in BOTH {
        let (output, stats) = Protector::new(&policy, &reverse)
            .protect_bytes(&input, mode, &mut NoTrace)
            .unwrap();
        // The helper is never encoded, even though it was added by the run.
        assert_eq!(entry_data(&output, HELPER_ENTRY), helper, "{mode}");
        let patched = entry_data(&output, "org/objectweb/asm/ClassReader.class");
        assert_eq!(&constructor_code(&patched, "([BIZ)V")[..3], [0x2b, 0x1c, 0xb8]);
        assert_eq!(constructor_code(&patched, "([BI)V").len(), 5);
        assert_eq!(stats.helpers_added, 1);
    }
}

#[test]
fn test_weak_patch_without_helper_bytes_fails() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("org/objectweb/asm/ClassReader.class", &shim_class(ASM_READER)),
    ]);
    let policy = ArchivePolicy::new("com.acme").strength(PatchStrength::Weak);
    for mode in BOTH {
        let err = Protector::new(&policy, &reverse)
            .protect_bytes(&input, mode, &mut NoTrace)
            .unwrap_err();
        assert!(
            matches!(&err, Error::MissingDecodeHelper { path } if path == HELPER_ENTRY),
            "{mode}: {err}"
        );
    }
}

#[test]
fn test_weak_patch_keeps_existing_helper() {
    let existing = b"existing helper".to_vec();
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        (HELPER_ENTRY, &existing),
        ("org/objectweb/asm/ClassReader.class", &shim_class(ASM_READER)),
    ]);
    let policy = ArchivePolicy::new("com.github").strength(PatchStrength::Weak);
    for mode in BOTH {
        let (output, stats) = Protector::new(&policy, &reverse)
            .protect_bytes(&input, mode, &mut NoTrace)
            .unwrap();
        assert_eq!(entry_data(&output, HELPER_ENTRY), existing);
        assert_eq!(stats.helpers_added, 0);
    }
}

#[test]
fn test_encode_failure_aborts_run() {
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("com/acme/Main.class", &plain_class("com/acme/Main")),
    ]);
    let policy = ArchivePolicy::new("com.acme");
    let failing = |_: &[u8]| -> std::io::Result<Vec<u8>> { Err(std::io::Error::other("no key")) };

    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("app.jar");
    fs::write(&input_path, &input).unwrap();
    let output_path = output_path_for(&input_path);

    for mode in BOTH {
        let err = Protector::new(&policy, &failing)
            .protect_file(&input_path, &output_path, mode, &mut NoTrace)
            .unwrap_err();
        match err {
            Error::EncodeFailed { path, reason } => {
                assert_eq!(path, "com/acme/Main.class");
                assert!(reason.contains("no key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output_path.exists());
    }
    // Only the input is left behind.
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_protect_file_replaces_output_and_cleans_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    fs::create_dir(&scratch).unwrap();
    let input_path = dir.path().join("app.war");
    fs::write(
        &input_path,
        jar(&[
            ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
            ("WEB-INF/classes/com/acme/Main.class", &plain_class("com/acme/Main")),
        ]),
    )
    .unwrap();
    let output_path = output_path_for(&input_path);
    assert_eq!(output_path, dir.path().join("app-enc.war"));
    fs::write(&output_path, b"stale").unwrap();

    let policy = ArchivePolicy::new("com.acme").scratch_root(&scratch);
    let stats = Protector::new(&policy, &reverse)
        .protect_file(&input_path, &output_path, PipelineMode::TwoPass, &mut NoTrace)
        .unwrap();

    assert_eq!(stats.encoded, 1);
    let output = fs::read(&output_path).unwrap();
    assert!(names(&output).contains(&"WEB-INF/classes/com/acme/Main.class".to_string()));
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_tree_trace_output() {
    let dep = jar(&[("com/acme/Lib.class", &plain_class("com/acme/Lib"))]);
    let input = jar(&[
        ("META-INF/MANIFEST.MF", &manifest("com.acme.Main")),
        ("lib/dep.jar", &dep),
        ("org/objectweb/asm/ClassReader.class", &shim_class(ASM_READER)),
        ("logback.xml", b"<configuration/>"),
    ]);
    let policy = ArchivePolicy::new("com.acme");
    let mut tree = TreeTrace::new(Vec::new(), true);
    Protector::new(&policy, &reverse)
        .protect_bytes(&input, PipelineMode::Streaming, &mut tree)
        .unwrap();
    let text = String::from_utf8(tree.into_inner()).unwrap();

    assert_eq!(
        text,
        "├── [A] lib/dep.jar\n\
         │   ├── [C] com/acme/Lib.class [E]\n\
         ├── [C] org/objectweb/asm/ClassReader.class [P]\n\
         ├── [R]  logback.xml\n"
    );
}
