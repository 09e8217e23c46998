use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

const REPORTED_VARIABLES: [&str; 7] = [
    "SHELL",
    "TERM",
    "RUST_LOG",
    "DSTORE_DATA_DIR",
    "DSTORE_DATA_FILE",
    "DSTORE_PORT",
    "DSTORE_MAX_UPLOAD_SIZE",
];

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&REPORTED_VARIABLES))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
