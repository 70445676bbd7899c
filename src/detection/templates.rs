//! Built-in build descriptor templates

use super::ProjectType;

/// Conventional descriptor file name, relative to the staging root
pub const DESCRIPTOR_FILE: &str = "Dockerfile";

pub const PYTHON_DOCKERFILE: &str = r#"FROM python:3.6-alpine
WORKDIR /app
COPY . ./
RUN pip install -r requirements.txt
CMD ["python", "main.py"]"#;

pub const JAVASCRIPT_DOCKERFILE: &str = r#"FROM node:10-alpine
WORKDIR /app
COPY . ./
RUN npm install
CMD ["npm", "start"]"#;

pub const GO_DOCKERFILE: &str = r#"FROM golang:1.10-alpine
WORKDIR /go/src/app
COPY . ./
RUN go get -v ./...
RUN go install
CMD ["/go/bin/app"]"#;

/// A marker file whose presence selects a project type
#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub file_name: &'static str,
    pub project_type: ProjectType,
    pub template: &'static str,
}

/// Probe order; also the order in which ambiguous matches are reported.
pub const MARKERS: &[Marker] = &[
    Marker {
        file_name: "package.json",
        project_type: ProjectType::JavaScript,
        template: JAVASCRIPT_DOCKERFILE,
    },
    Marker {
        file_name: "requirements.txt",
        project_type: ProjectType::Python,
        template: PYTHON_DOCKERFILE,
    },
    Marker {
        file_name: "main.go",
        project_type: ProjectType::Go,
        template: GO_DOCKERFILE,
    },
];
