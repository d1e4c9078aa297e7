use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AvailableResult, ConfigResult, DatasetLoader, DownloadResult, EntryResult, ListResult,
    ProcessResult, ProgressEvent, ProgressSink, QueryResult, RemoveResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable output; progress goes to stderr when verbose.
pub struct TextOutput {
    pub verbose: bool,
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        if !self.verbose {
            return;
        }
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl TextOutput {
    pub fn print_download(result: &DownloadResult) {
        println!("{} -> {}", result.dataset, result.data_dir);
        for file in &result.files {
            let extracted = if file.extracted { ", extracted" } else { "" };
            println!(
                "  {} ({}, checksum {}{extracted})",
                file.path, file.action, file.checksum
            );
        }
    }

    pub fn print_process(result: &ProcessResult) {
        println!("{}/{} -> {}", result.dataset, result.task, result.filename);
    }

    pub fn print_load(loader: &DatasetLoader) {
        println!("dataset:  {}", loader.name);
        println!("task:     {}", loader.task);
        println!("data dir: {}", loader.data_dir);
        println!("file:     {}", loader.filename);
        if !loader.categories.is_empty() {
            println!("categories: {}", loader.categories.join(", "));
        }
    }

    pub fn print_entry(result: &EntryResult) {
        let entry = &result.entry;
        println!("{}", result.dataset);
        println!("  cache dir: {}", entry.cache_dir);
        println!("  data dir:  {}", entry.data_dir);
        for (task, task_entry) in &entry.tasks {
            println!("  task {task}: {}", task_entry.filename);
        }
        if !entry.keywords.is_empty() {
            let keywords: Vec<&str> = entry.keywords.iter().map(String::as_str).collect();
            println!("  keywords: {}", keywords.join(", "));
        }
    }

    pub fn print_remove(result: &RemoveResult) {
        match &result.task {
            Some(task) => println!("removed task {task} from {}", result.dataset),
            None => println!("removed {}", result.dataset),
        }
        for path in &result.removed_paths {
            println!("  deleted {path}");
        }
    }

    pub fn print_config(result: &ConfigResult) {
        println!("cache file: {}", result.registry_path);
        if let Some(deleted) = &result.deleted {
            if deleted.file_deleted {
                println!("cache file deleted");
            }
            for dir in &deleted.removed_dirs {
                println!("  deleted {dir}");
            }
        }
        println!("root_cache_dir:     {}", result.info.root_cache_dir);
        println!("root_downloads_dir: {}", result.info.root_downloads_dir);
    }

    pub fn print_query(result: &QueryResult) {
        if result.is_empty() {
            println!("no matches for {}", result.pattern);
            return;
        }
        for name in result.datasets.keys() {
            println!("dataset  {name}");
        }
        for task in &result.tasks {
            println!("task     {}/{} -> {}", task.dataset, task.task, task.filename);
        }
        for (category, by_dataset) in &result.categories {
            for (dataset, tasks) in by_dataset {
                println!("category {category}: {dataset} [{}]", tasks.join(", "));
            }
        }
    }

    pub fn print_list(result: &ListResult) {
        if result.datasets.is_empty() {
            println!("no datasets in cache");
            return;
        }
        for entry in &result.datasets {
            println!("{} [{}] {}", entry.name, entry.tasks.join(", "), entry.data_dir);
        }
    }

    pub fn print_available(result: &AvailableResult) {
        for entry in &result.datasets {
            let marker = if entry.installed { "*" } else { " " };
            println!(
                "{marker} {} (default: {}; tasks: {})",
                entry.name,
                entry.default_task,
                entry.tasks.join(", ")
            );
        }
    }
}
