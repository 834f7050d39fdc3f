macros::lib_main!(snapmeta);
