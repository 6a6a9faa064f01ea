//! セッションの初期化・設定コマンド・アンワインドのテスト

use hubble_core::frame_filter::{FrameInfo, DEOPT_FRAMES};
use hubble_core::unwinder::{DEOPTIMIZED_FRAME_TYPE, DEOPT_STUB_SYMBOL, FRAME_SIZE_FIELD};
use hubble_core::{Command, ModuleHandle, Session, SessionState};
use hubble_runtime::InspectError;
use hubble_target::testing::FakeTarget;
use hubble_target::{FieldInfo, FrameRegisterState, Register, TypeInfo, ISOLATE_SYMBOL};

const STUB: u64 = 0x50_0000;
const STACK: u64 = 0x7fff_0000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn int() -> TypeInfo {
    TypeInfo::primitive("int", 4)
}

fn module() -> ModuleHandle {
    ModuleHandle::new("/opt/app/hello")
}

fn run(session: &mut Session, input: &str) -> String {
    let command = Command::parse(input).unwrap();
    session.execute(command)
}

/// 脱最適化フレームのレイアウトとスタブを持つターゲット
fn deopt_target() -> FakeTarget {
    let mut target = FakeTarget::new();
    target.add_symbol(DEOPT_STUB_SYMBOL, STUB);
    target.add_type(TypeInfo::Struct {
        name: DEOPTIMIZED_FRAME_TYPE.to_string(),
        size: 24,
        fields: vec![FieldInfo::instance(
            FRAME_SIZE_FIELD,
            16,
            TypeInfo::primitive("long", 8),
        )],
    });
    target
}

#[test]
fn test_bootstrap_on_runtime_module() {
    init_tracing();
    let mut session = Session::new(Box::new(deopt_target()));
    assert_eq!(session.register(&module()), SessionState::Active);
    assert_eq!(session.deopt_stub(), Some(STUB));

    assert_eq!(
        session.register(&ModuleHandle::new("/opt/app/libextra.so")),
        SessionState::Active
    );
    assert_eq!(session.modules().len(), 2);
}

#[test]
fn test_non_runtime_module_stays_dormant() {
    init_tracing();
    let mut target = FakeTarget::new();
    target.remove_symbol(ISOLATE_SYMBOL);
    target.define_class("app.Leaf", &[("id", int())]);
    let leaf = target.new_object("app.Leaf");
    let value = target.reference("app.Leaf", leaf);

    let mut session = Session::new(Box::new(target));
    assert_eq!(session.register(&module()), SessionState::Dormant);
    assert!(session.modules().is_empty());
    assert_eq!(session.print(&value), format!("(app.Leaf) 0x{:x}", leaf));
}

#[test]
fn test_missing_type_metadata_disables_session() {
    let mut target = FakeTarget::new();
    target.remove_type("java.lang.Class");

    let mut session = Session::new(Box::new(target));
    assert_eq!(session.register(&module()), SessionState::Disabled);
    assert_eq!(session.register(&module()), SessionState::Disabled);
    assert!(session.modules().is_empty());
}

#[test]
fn test_print_when_active() {
    let mut target = FakeTarget::new();
    target.define_class("app.Leaf", &[("id", int())]);
    let leaf = target.new_object("app.Leaf");
    target.set_field(leaf, "app.Leaf", "id", 4);
    let value = target.reference("app.Leaf", leaf);

    let mut session = Session::new(Box::new(target));
    session.register(&module());
    assert_eq!(session.print(&value), "app.Leaf = {id = 4}");

    run(&mut session, "svm-print disable");
    assert_eq!(session.print(&value), format!("(app.Leaf) 0x{:x}", leaf));

    run(&mut session, "svm-print enable");
    assert_eq!(session.print(&value), "app.Leaf = {id = 4}");
}

#[test]
fn test_toggle_reports() {
    let mut session = Session::new(Box::new(FakeTarget::new()));
    assert_eq!(run(&mut session, "svm-print"), "svm-print is enabled");
    assert_eq!(run(&mut session, "svm-use-hlrep"), "svm-use-hlrep is disabled");
    assert_eq!(run(&mut session, "svm-selfref-check"), "svm-selfref-check is enabled");

    assert_eq!(run(&mut session, "svm-use-hlrep on"), "");
    assert_eq!(run(&mut session, "svm-use-hlrep"), "svm-use-hlrep is enabled");
    run(&mut session, "svm-selfref-check off");
    assert_eq!(run(&mut session, "svm-selfref-check"), "svm-selfref-check is disabled");

    run(&mut session, "svm-print-static-fields yes");
    assert_eq!(
        run(&mut session, "svm-print-static-fields"),
        "svm-print-static-fields is disabled"
    );
    run(&mut session, "svm-print-static-fields on");
    assert_eq!(
        run(&mut session, "svm-print-static-fields"),
        "svm-print-static-fields is enabled"
    );
    assert_eq!(
        run(&mut session, "svm-complete-static-variables"),
        "svm-complete-static-variables is disabled"
    );
}

#[test]
fn test_print_address_modes() {
    let mut session = Session::new(Box::new(FakeTarget::new()));
    assert_eq!(
        run(&mut session, "svm-print-address"),
        "svm-print-address is disabled\nwith address mode normal"
    );

    run(&mut session, "svm-print-address absolute");
    assert_eq!(
        run(&mut session, "svm-print-address"),
        "svm-print-address is enabled\nwith address mode all absolute"
    );

    run(&mut session, "svm-print-address disable");
    let config = session.inspector().config();
    assert!(!config.with_address);
    assert!(config.absolute_address);

    run(&mut session, "svm-print-address enable");
    let config = session.inspector().config();
    assert!(config.with_address);
    assert!(!config.absolute_address);
}

#[test]
fn test_limit_reports() {
    let mut session = Session::new(Box::new(FakeTarget::new()));
    assert_eq!(
        run(&mut session, "svm-print-cstr-limit"),
        "svm-print-cstr-limit current value 40"
    );
    assert_eq!(
        run(&mut session, "svm-print-array-limit"),
        "svm-print-array-limit current value 10"
    );
    run(&mut session, "svm-print-depth-limit 5");
    assert_eq!(
        run(&mut session, "svm-print-depth-limit"),
        "svm-print-depth-limit current value 5"
    );
}

#[test]
fn test_pp_command() {
    let mut target = FakeTarget::new();
    target.add_local("answer", hubble_target::RawValue::new(int(), 42, None));
    let mut session = Session::new(Box::new(target));
    session.register(&module());

    assert_eq!(run(&mut session, "pp answer"), "42");
    assert_eq!(
        run(&mut session, "pp question"),
        "No Java debug-expression \"question\" in current context."
    );
    match session.try_resolve("question") {
        Err(InspectError::ResolutionMiss(path)) => assert_eq!(path, "question"),
        other => panic!("unexpected resolution: {:?}", other),
    }
    assert_eq!(session.try_resolve("answer").unwrap().bits, 42);
}

#[test]
fn test_prompt_resets_cycle_state() {
    let mut target = FakeTarget::new();
    target.define_class(
        "app.Node",
        &[("next", TypeInfo::reference("app.Node", false)), ("value", int())],
    );
    let node = target.new_object("app.Node");
    target.set_field(node, "app.Node", "next", node);
    target.set_field(node, "app.Node", "value", 5);
    let value = target.reference("app.Node", node);

    let mut session = Session::new(Box::new(target));
    session.register(&module());
    let expected = "app.Node = {next = app.Node = {...}, value = 5}";
    assert_eq!(session.print(&value), expected);

    // 表示後も循環の記録は残り、子を持たない
    let inspector = session.inspector();
    assert!(inspector.is_cycle(&value));
    assert_eq!(inspector.formatter().children_of(&value).count(), 0);

    session.on_prompt();
    let inspector = session.inspector();
    assert!(!inspector.is_cycle(&value));
    assert_eq!(inspector.formatter().children_of(&value).count(), 2);
    assert_eq!(session.print(&value), expected);
}

#[test]
fn test_unwind_deopt_frame() {
    let mut target = deopt_target();
    let record = target.alloc(24);
    let frame_size = 0x40;
    target.write_u64(record + 16, frame_size);
    target.write_u64(STACK, record);
    target.write_u64(STACK + frame_size - 8, 0x40_2000);

    let mut session = Session::new(Box::new(target));
    session.register(&module());

    let frame = FrameRegisterState::new(STACK, STUB);
    let info = session.unwind(&frame).unwrap();
    assert_eq!(info.frame_id, frame);
    assert_eq!(info.caller, FrameRegisterState::new(STACK + frame_size, 0x40_2000));
    assert_eq!(
        info.saved_registers(),
        [(Register::Rsp, STACK + frame_size), (Register::Rip, 0x40_2000)]
    );

    let other = FrameRegisterState::new(STACK, STUB + 4);
    assert!(session.unwind(&other).is_none());
}

#[test]
fn test_unwinder_is_inert_without_stub() {
    let mut session = Session::new(Box::new(FakeTarget::new()));
    session.register(&module());
    assert_eq!(session.deopt_stub(), None);
    assert!(session.unwind(&FrameRegisterState::new(STACK, STUB)).is_none());
}

#[test]
fn test_frame_decoration() {
    let mut session = Session::new(Box::new(deopt_target()));
    session.register(&module());

    let deopt = FrameInfo {
        pc: STUB,
        sp: STACK,
        name: Some("Deoptimizer.deoptStub".to_string()),
        ..Default::default()
    };
    let decorated = session.decorate_frame(&deopt);
    assert_eq!(decorated.function, DEOPT_FRAMES);
    assert!(decorated.hide_variables);

    let regular = FrameInfo {
        pc: 0x40_1000,
        sp: STACK,
        name: Some("app.Main.main(java.lang.String[])".to_string()),
        file: Some("app/Main.java".to_string()),
        line: Some(12),
        ..Default::default()
    };
    assert_eq!(session.decorate_frame(&regular).function, "app.Main.main(Main.java:12)");
}

#[test]
fn test_unnamed_frame_uses_symbol() {
    let mut target = FakeTarget::new();
    target.add_symbol("app.Main.run", 0x40_3000);
    let mut session = Session::new(Box::new(target));
    session.register(&module());

    let frame = FrameInfo {
        pc: 0x40_3000,
        sp: STACK,
        ..Default::default()
    };
    assert_eq!(session.decorate_frame(&frame).function, "app.Main.run");

    let unknown = FrameInfo {
        pc: 0x40_3004,
        sp: STACK,
        ..Default::default()
    };
    assert_eq!(
        session.decorate_frame(&unknown).function,
        format!("Unknown Frame at 0x{:x}", STACK)
    );
}
